use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::db::models::{SchoolClass, Subject};
use crate::repositories::classes::{ClassWithCounts, SubjectWithClass};

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ClassCreate {
    #[validate(length(min = 1, max = 50, message = "name must be 1-50 characters"))]
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ClassUpdate {
    #[serde(default)]
    #[validate(length(min = 1, max = 50, message = "name must be 1-50 characters"))]
    pub(crate) name: Option<String>,
    #[serde(default)]
    pub(crate) description: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ClassResponse {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) subject_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) student_count: Option<i64>,
}

impl From<SchoolClass> for ClassResponse {
    fn from(class: SchoolClass) -> Self {
        Self {
            id: class.id,
            name: class.name,
            description: class.description,
            subject_count: None,
            student_count: None,
        }
    }
}

impl From<ClassWithCounts> for ClassResponse {
    fn from(row: ClassWithCounts) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            subject_count: Some(row.subject_count),
            student_count: Some(row.student_count),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubjectListQuery {
    #[serde(default, alias = "classId")]
    pub(crate) class_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct SubjectCreate {
    #[validate(length(min = 1, max = 100, message = "name must be 1-100 characters"))]
    pub(crate) name: String,
    #[serde(alias = "schoolClassId", alias = "class_id")]
    pub(crate) school_class_id: String,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct SubjectUpdate {
    #[serde(default)]
    #[validate(length(min = 1, max = 100, message = "name must be 1-100 characters"))]
    pub(crate) name: Option<String>,
    #[serde(default, alias = "schoolClassId", alias = "class_id")]
    pub(crate) school_class_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubjectResponse {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) school_class_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) class_name: Option<String>,
}

impl From<Subject> for SubjectResponse {
    fn from(subject: Subject) -> Self {
        Self {
            id: subject.id,
            name: subject.name,
            school_class_id: subject.school_class_id,
            class_name: None,
        }
    }
}

impl From<SubjectWithClass> for SubjectResponse {
    fn from(row: SubjectWithClass) -> Self {
        Self {
            id: row.id,
            name: row.name,
            school_class_id: row.school_class_id,
            class_name: Some(row.class_name),
        }
    }
}
