use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::User;
use crate::db::types::{ApprovalStatus, UserRole};

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct SignupRequest {
    #[validate(length(min = 3, max = 150, message = "username must be 3-150 characters"))]
    pub(crate) username: String,
    #[validate(email(message = "invalid email"))]
    pub(crate) email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters long"))]
    pub(crate) password: String,
    #[serde(default, alias = "firstName")]
    pub(crate) first_name: String,
    #[serde(default, alias = "lastName")]
    pub(crate) last_name: String,
    pub(crate) role: UserRole,
    #[serde(default, alias = "schoolClassId")]
    pub(crate) school_class_id: Option<String>,
    #[serde(default)]
    pub(crate) phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginRequest {
    pub(crate) username: String,
    pub(crate) password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct UpdateMeRequest {
    #[serde(default, alias = "firstName")]
    pub(crate) first_name: Option<String>,
    #[serde(default, alias = "lastName")]
    pub(crate) last_name: Option<String>,
    #[serde(default)]
    #[validate(email(message = "invalid email"))]
    pub(crate) email: Option<String>,
    #[serde(default)]
    pub(crate) phone: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct AdminUserCreate {
    #[validate(length(min = 3, max = 150, message = "username must be 3-150 characters"))]
    pub(crate) username: String,
    #[validate(email(message = "invalid email"))]
    pub(crate) email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters long"))]
    pub(crate) password: String,
    #[serde(default, alias = "firstName")]
    pub(crate) first_name: String,
    #[serde(default, alias = "lastName")]
    pub(crate) last_name: String,
    #[serde(default = "default_user_role")]
    pub(crate) role: UserRole,
    #[serde(default = "default_approved")]
    #[serde(alias = "approvalStatus")]
    pub(crate) approval_status: ApprovalStatus,
    #[serde(default, alias = "schoolClassId")]
    pub(crate) school_class_id: Option<String>,
    #[serde(default)]
    pub(crate) phone: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub(crate) struct AdminUserUpdate {
    #[serde(default)]
    #[validate(length(min = 3, max = 150, message = "username must be 3-150 characters"))]
    pub(crate) username: Option<String>,
    #[serde(default)]
    #[validate(email(message = "invalid email"))]
    pub(crate) email: Option<String>,
    #[serde(default, alias = "firstName")]
    pub(crate) first_name: Option<String>,
    #[serde(default, alias = "lastName")]
    pub(crate) last_name: Option<String>,
    #[serde(default)]
    #[validate(length(min = 8, message = "Password must be at least 8 characters long"))]
    pub(crate) password: Option<String>,
    #[serde(default)]
    pub(crate) role: Option<UserRole>,
    #[serde(default, alias = "isActive")]
    pub(crate) is_active: Option<bool>,
    /// `Some(None)` detaches the user from any class.
    #[serde(default, alias = "schoolClassId", deserialize_with = "double_option")]
    pub(crate) school_class_id: Option<Option<String>>,
    #[serde(default)]
    pub(crate) phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserStatusUpdate {
    pub(crate) status: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TeacherProfileUpdate {
    #[serde(default, alias = "subjectAssignedId")]
    pub(crate) subject_assigned_id: Option<String>,
    #[serde(default)]
    pub(crate) qualification: Option<String>,
    #[serde(default, alias = "yearsOfExperience")]
    pub(crate) years_of_experience: Option<i32>,
    #[serde(default, alias = "nextOfKin")]
    pub(crate) next_of_kin: Option<String>,
    #[serde(default, alias = "nextOfKinPhone")]
    pub(crate) next_of_kin_phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserListQuery {
    #[serde(default)]
    pub(crate) role: Option<UserRole>,
    #[serde(default)]
    pub(crate) status: Option<ApprovalStatus>,
    #[serde(default)]
    pub(crate) search: Option<String>,
    #[serde(default)]
    pub(crate) skip: i64,
    #[serde(default = "crate::api::pagination::default_limit")]
    pub(crate) limit: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct UserResponse {
    pub(crate) id: String,
    pub(crate) username: String,
    pub(crate) email: String,
    pub(crate) first_name: String,
    pub(crate) last_name: String,
    pub(crate) full_name: String,
    pub(crate) role: UserRole,
    pub(crate) approval_status: ApprovalStatus,
    pub(crate) is_active: bool,
    pub(crate) school_class_id: Option<String>,
    pub(crate) phone: Option<String>,
    pub(crate) subject_assigned_id: Option<String>,
    pub(crate) qualification: Option<String>,
    pub(crate) years_of_experience: Option<i32>,
    pub(crate) next_of_kin: Option<String>,
    pub(crate) next_of_kin_phone: Option<String>,
    pub(crate) has_profile_picture: bool,
    pub(crate) created_at: String,
}

impl UserResponse {
    pub(crate) fn from_db(user: User) -> Self {
        Self {
            full_name: user.full_name(),
            has_profile_picture: user.profile_picture.is_some(),
            id: user.id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            role: user.role,
            approval_status: user.approval_status,
            is_active: user.is_active,
            school_class_id: user.school_class_id,
            phone: user.phone,
            subject_assigned_id: user.subject_assigned_id,
            qualification: user.qualification,
            years_of_experience: user.years_of_experience,
            next_of_kin: user.next_of_kin,
            next_of_kin_phone: user.next_of_kin_phone,
            created_at: format_primitive(user.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ProfilePictureResponse {
    pub(crate) url: String,
}

fn default_user_role() -> UserRole {
    UserRole::Student
}

fn default_approved() -> ApprovalStatus {
    ApprovalStatus::Approved
}

fn double_option<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}
