pub(crate) mod attempts;
pub(crate) mod audit;
pub(crate) mod notifications;
pub(crate) mod quiz_authoring;
pub(crate) mod quiz_excel;
pub(crate) mod reports;
pub(crate) mod scoring;
pub(crate) mod storage;
