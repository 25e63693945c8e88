use serde::{Deserialize, Serialize};

/// Closed classification of LTI role URIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleClass {
    Instructor,
    Learner,
    Unknown,
}

impl RoleClass {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Instructor => "instructor",
            Self::Learner => "learner",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for RoleClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role URIs (and LTI short names) treated as instructor-like.
pub const INSTRUCTOR_ROLES: &[&str] = &[
    "http://purl.imsglobal.org/vocab/lis/v2/membership#Instructor",
    "http://purl.imsglobal.org/vocab/lis/v2/membership#Administrator",
    "http://purl.imsglobal.org/vocab/lis/v2/membership#ContentDeveloper",
    "http://purl.imsglobal.org/vocab/lis/v2/membership/Instructor#TeachingAssistant",
    "http://purl.imsglobal.org/vocab/lis/v2/institution/person#Instructor",
    "http://purl.imsglobal.org/vocab/lis/v2/institution/person#Faculty",
    "http://purl.imsglobal.org/vocab/lis/v2/institution/person#Administrator",
    "http://purl.imsglobal.org/vocab/lis/v2/system/person#Administrator",
    "http://purl.imsglobal.org/vocab/lis/v2/system/person#SysAdmin",
    "Instructor",
    "TeachingAssistant",
    "Administrator",
    "ContentDeveloper",
];

/// Role URIs (and LTI short names) treated as learner-like.
pub const LEARNER_ROLES: &[&str] = &[
    "http://purl.imsglobal.org/vocab/lis/v2/membership#Learner",
    "http://purl.imsglobal.org/vocab/lis/v2/membership/Learner#Learner",
    "http://purl.imsglobal.org/vocab/lis/v2/institution/person#Student",
    "http://purl.imsglobal.org/vocab/lis/v2/institution/person#Learner",
    "Learner",
    "Student",
];

/// Classify a single role. Matching is exact; anything not listed is `Unknown`.
#[must_use]
pub fn classify_role(role: &str) -> RoleClass {
    if INSTRUCTOR_ROLES.contains(&role) {
        RoleClass::Instructor
    } else if LEARNER_ROLES.contains(&role) {
        RoleClass::Learner
    } else {
        RoleClass::Unknown
    }
}

/// Classify a role set. Instructor-like wins over learner-like; unrecognized
/// roles are ignored.
#[must_use]
pub fn classify_roles<S: AsRef<str>>(roles: &[S]) -> RoleClass {
    let mut class = RoleClass::Unknown;
    for role in roles {
        match classify_role(role.as_ref()) {
            RoleClass::Instructor => return RoleClass::Instructor,
            RoleClass::Learner => class = RoleClass::Learner,
            RoleClass::Unknown => {}
        }
    }
    class
}
