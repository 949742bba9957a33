use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

use crate::auth::{Role, SessionUser};
use crate::error::AppError;
use crate::listing::FilterValue;
use crate::validation::MIN_PASSWORD_LENGTH;

use super::{ChurchSummary, PositionSummary, SubjectSummary, sqlite_text_enum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }
}

impl FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            _ => Err(format!("Unknown gender: {}", s)),
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

sqlite_text_enum!(Gender);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaritalStatus {
    Single,
    Married,
    Widowed,
}

impl MaritalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaritalStatus::Single => "single",
            MaritalStatus::Married => "married",
            MaritalStatus::Widowed => "widowed",
        }
    }
}

impl FromStr for MaritalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(MaritalStatus::Single),
            "married" => Ok(MaritalStatus::Married),
            "widowed" => Ok(MaritalStatus::Widowed),
            _ => Err(format!("Unknown status: {}", s)),
        }
    }
}

impl fmt::Display for MaritalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

sqlite_text_enum!(MaritalStatus);

/// Every `users` column except the password hash.
pub const USER_COLUMNS: &str = "id, email, role, firstname, lastname, middlename, \
     profile_picture, birthday, gender, contact, address, description, status, \
     sss, sss_image, pagibig, pagibig_image, tin, tin_image, psn, psn_image, \
     philhealth, philhealth_image, church_id, position_id, created_at, updated_at";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub email: String,
    pub role: Role,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub middlename: Option<String>,
    pub profile_picture: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub contact: Option<String>,
    pub address: Option<String>,
    pub description: Option<String>,
    pub status: Option<MaritalStatus>,
    pub sss: Option<String>,
    pub sss_image: Option<String>,
    pub pagibig: Option<String>,
    pub pagibig_image: Option<String>,
    pub tin: Option<String>,
    pub tin_image: Option<String>,
    pub psn: Option<String>,
    pub psn_image: Option<String>,
    pub philhealth: Option<String>,
    pub philhealth_image: Option<String>,
    pub church_id: Option<i64>,
    pub position_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// First, middle and last name with blanks dropped.
    pub fn display_name(&self) -> String {
        [&self.firstname, &self.middlename, &self.lastname]
            .into_iter()
            .flatten()
            .map(|part| part.trim())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn session_user(&self) -> SessionUser {
        SessionUser {
            id: self.id,
            role: self.role,
            name: self.display_name(),
            email: self.email.clone(),
            image: self.profile_picture.clone(),
        }
    }
}

/// A user as listed under a position or subject.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: i64,
    pub email: String,
    pub role: Role,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub middlename: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Child {
    pub id: i64,
    pub user_id: i64,
    pub firstname: String,
    pub lastname: String,
    pub middlename: Option<String>,
    pub birthday: NaiveDate,
    pub gender: Gender,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct EducationalAttainment {
    pub id: i64,
    pub user_id: i64,
    pub schoolname: String,
    pub education: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Case {
    pub id: i64,
    pub user_id: i64,
    pub year: i64,
    #[serde(rename = "where")]
    pub place: String,
    #[serde(rename = "case")]
    pub case_name: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A user with its relations and dependent collections.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserDetail {
    #[serde(flatten)]
    pub user: User,
    pub church: Option<ChurchSummary>,
    pub position: Option<PositionSummary>,
    pub subjects: Vec<SubjectSummary>,
    pub children: Vec<Child>,
    pub educational_attainment: Vec<EducationalAttainment>,
    pub cases: Vec<Case>,
}

/// What the admin endpoints expose.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdminAccount {
    pub id: i64,
    pub email: String,
    pub role: Role,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub middlename: Option<String>,
    pub profile_picture: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for AdminAccount {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            role: user.role,
            firstname: user.firstname,
            lastname: user.lastname,
            middlename: user.middlename,
            profile_picture: user.profile_picture,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Optional scalar profile columns shared by every user write.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProfileFields {
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub middlename: Option<String>,
    pub profile_picture: Option<String>,
    #[serde(default, deserialize_with = "super::optional_date")]
    pub birthday: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub contact: Option<String>,
    pub address: Option<String>,
    pub description: Option<String>,
    pub status: Option<MaritalStatus>,
    pub sss: Option<String>,
    pub sss_image: Option<String>,
    pub pagibig: Option<String>,
    pub pagibig_image: Option<String>,
    pub tin: Option<String>,
    pub tin_image: Option<String>,
    pub psn: Option<String>,
    pub psn_image: Option<String>,
    pub philhealth: Option<String>,
    pub philhealth_image: Option<String>,
    pub church_id: Option<i64>,
    pub position_id: Option<i64>,
}

impl ProfileFields {
    /// Column assignments for the fields that are present.
    pub fn assignments(&self) -> Vec<(&'static str, FilterValue)> {
        fn put<V: Into<FilterValue>>(
            out: &mut Vec<(&'static str, FilterValue)>,
            column: &'static str,
            value: Option<V>,
        ) {
            if let Some(value) = value {
                out.push((column, value.into()));
            }
        }

        let mut out = Vec::new();
        put(&mut out, "firstname", self.firstname.clone());
        put(&mut out, "lastname", self.lastname.clone());
        put(&mut out, "middlename", self.middlename.clone());
        put(&mut out, "profile_picture", self.profile_picture.clone());
        put(&mut out, "birthday", self.birthday);
        put(&mut out, "gender", self.gender.map(|g| g.as_str()));
        put(&mut out, "contact", self.contact.clone());
        put(&mut out, "address", self.address.clone());
        put(&mut out, "description", self.description.clone());
        put(&mut out, "status", self.status.map(|s| s.as_str()));
        put(&mut out, "sss", self.sss.clone());
        put(&mut out, "sss_image", self.sss_image.clone());
        put(&mut out, "pagibig", self.pagibig.clone());
        put(&mut out, "pagibig_image", self.pagibig_image.clone());
        put(&mut out, "tin", self.tin.clone());
        put(&mut out, "tin_image", self.tin_image.clone());
        put(&mut out, "psn", self.psn.clone());
        put(&mut out, "psn_image", self.psn_image.clone());
        put(&mut out, "philhealth", self.philhealth.clone());
        put(&mut out, "philhealth_image", self.philhealth_image.clone());
        put(&mut out, "church_id", self.church_id);
        put(&mut out, "position_id", self.position_id);
        out
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewChild {
    pub firstname: String,
    pub lastname: String,
    pub middlename: Option<String>,
    #[serde(deserialize_with = "super::required_date")]
    pub birthday: NaiveDate,
    pub gender: Gender,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewEducationalAttainment {
    pub schoolname: String,
    pub education: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewCase {
    pub year: i64,
    #[serde(rename = "where")]
    pub place: String,
    #[serde(rename = "case")]
    pub case_name: String,
    pub reason: String,
}

/// Dependent collections carried by a user write. `None` leaves a
/// collection untouched; `Some(vec![])` clears it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DependentsInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<NewChild>>,
    #[serde(default, alias = "eudcationalAttainment", skip_serializing_if = "Option::is_none")]
    pub educational_attainment: Option<Vec<NewEducationalAttainment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cases: Option<Vec<NewCase>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subjects: Option<Vec<i64>>,
}

impl DependentsInput {
    pub fn check(&self) -> Result<(), AppError> {
        fn required(value: &str, message: &str) -> Result<(), AppError> {
            if value.trim().is_empty() {
                return Err(AppError::Validation(message.to_string()));
            }
            Ok(())
        }

        for child in self.children.iter().flatten() {
            required(&child.firstname, "Child first name is required")?;
            required(&child.lastname, "Child last name is required")?;
        }

        for attainment in self.educational_attainment.iter().flatten() {
            required(&attainment.schoolname, "School name is required")?;
            required(&attainment.education, "Education is required")?;
        }

        for case in self.cases.iter().flatten() {
            required(&case.place, "Case location is required")?;
            required(&case.case_name, "Case is required")?;
            required(&case.reason, "Case reason is required")?;
        }

        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    #[serde(default)]
    #[validate(
        length(min = 1, message = "Email is required"),
        email(message = "Invalid email address")
    )]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = MIN_PASSWORD_LENGTH, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirm_password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(flatten)]
    pub profile: ProfileFields,
    #[serde(flatten)]
    pub dependents: DependentsInput,
}

/// A partial user update. Absent fields keep their stored value.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UserChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = MIN_PASSWORD_LENGTH, message = "Password must be at least 8 characters"))]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirm_password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(flatten)]
    pub profile: ProfileFields,
    #[serde(flatten)]
    pub dependents: DependentsInput,
}

impl UserChanges {
    /// Edit forms send an empty password when it is not being changed.
    pub fn without_blank_password(mut self) -> Self {
        if self.password.as_deref().is_some_and(|p| p.is_empty()) {
            self.password = None;
            self.confirm_password = None;
        }
        self
    }
}

/// First-admin bootstrap payload.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapAdmin {
    #[serde(default)]
    #[validate(length(min = 1, message = "First name is required"))]
    pub first_name: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Last name is required"))]
    pub last_name: String,
    #[serde(default)]
    #[validate(
        length(min = 1, message = "Email is required"),
        email(message = "Invalid email address")
    )]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = MIN_PASSWORD_LENGTH, message = "Password must be at least 8 characters"))]
    pub password: String,
}

impl BootstrapAdmin {
    pub fn into_new_user(self) -> NewUser {
        NewUser {
            email: self.email,
            password: self.password.clone(),
            confirm_password: Some(self.password),
            role: Some(Role::Admin),
            profile: ProfileFields {
                firstname: Some(self.first_name),
                lastname: Some(self.last_name),
                ..Default::default()
            },
            dependents: DependentsInput::default(),
        }
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_payload_reads_nested_collections() {
        let payload: NewUser = serde_json::from_str(
            r#"{
                "email": "worker@example.com",
                "password": "password123",
                "confirmPassword": "password123",
                "firstname": "Juan",
                "birthday": "1990-01-01T00:00:00.000Z",
                "gender": "male",
                "churchId": 3,
                "children": [
                    {"firstname": "Ana", "lastname": "Cruz", "birthday": "2015-06-01", "gender": "female"}
                ],
                "eudcationalAttainment": [{"schoolname": "UP", "education": "BS"}],
                "cases": [{"year": 2020, "where": "Manila", "case": "None", "reason": "N/A"}],
                "subjects": [1, 2]
            }"#,
        )
        .unwrap();

        assert_eq!(payload.profile.birthday, NaiveDate::from_ymd_opt(1990, 1, 1));
        assert_eq!(payload.profile.church_id, Some(3));
        assert_eq!(payload.dependents.children.as_ref().map(Vec::len), Some(1));
        assert_eq!(
            payload.dependents.educational_attainment.as_ref().map(Vec::len),
            Some(1)
        );
        assert_eq!(payload.dependents.cases.as_ref().unwrap()[0].place, "Manila");
        assert_eq!(payload.dependents.subjects, Some(vec![1, 2]));
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn test_absent_collections_are_none_and_empty_ones_are_not() {
        let changes: UserChanges =
            serde_json::from_str(r#"{"firstname": "Juan", "children": []}"#).unwrap();

        assert_eq!(changes.dependents.children, Some(vec![]));
        assert_eq!(changes.dependents.cases, None);
        assert_eq!(changes.dependents.subjects, None);
    }

    #[test]
    fn test_assignments_skip_absent_fields() {
        let profile = ProfileFields {
            firstname: Some("Juan".into()),
            gender: Some(Gender::Male),
            church_id: Some(4),
            ..Default::default()
        };

        let columns: Vec<_> = profile.assignments().into_iter().map(|(c, _)| c).collect();
        assert_eq!(columns, vec!["firstname", "gender", "church_id"]);
    }

    #[test]
    fn test_display_name_drops_blanks() {
        let payload: User = serde_json::from_value(serde_json::json!({
            "id": 1,
            "email": "a@example.com",
            "role": "worker",
            "firstname": "Juan",
            "middlename": " ",
            "lastname": "Cruz",
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-01T00:00:00Z"
        }))
        .unwrap();

        assert_eq!(payload.display_name(), "Juan Cruz");
    }

    #[test]
    fn test_blank_dependent_fields_rejected() {
        let dependents = DependentsInput {
            educational_attainment: Some(vec![NewEducationalAttainment {
                schoolname: " ".into(),
                education: "BS".into(),
            }]),
            ..Default::default()
        };

        assert!(matches!(dependents.check(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_blank_password_means_unchanged() {
        let changes = UserChanges {
            password: Some(String::new()),
            confirm_password: Some(String::new()),
            ..Default::default()
        }
        .without_blank_password();

        assert_eq!(changes.password, None);
        assert!(changes.validate().is_ok());
    }
}
