pub(crate) mod attempts;
pub(crate) mod auth;
pub(crate) mod classes;
pub(crate) mod dashboards;
pub(crate) mod errors;
pub(crate) mod grading;
pub(crate) mod guards;
pub(crate) mod handlers;
pub(crate) mod notifications;
pub(crate) mod pagination;
pub(crate) mod quizzes;
pub(crate) mod reports;
pub(crate) mod retakes;
pub(crate) mod router;
pub(crate) mod users;
pub(crate) mod validation;
