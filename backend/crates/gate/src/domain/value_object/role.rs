use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::sector::{ADMIN_ROOT, PUBLIC_HOME, Sector};

/// Authorization level of an identity.
///
/// Closed set. `User` is the absence value and never grants admin
/// capability. `SuperAdmin` covers every other role, and that rule lives
/// only in [`Role::is_superset_of`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    CharityAmir,
    AcademicAmir,
    QiratAmir,
    DawaAmir,
    #[default]
    User,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::SuperAdmin,
        Role::CharityAmir,
        Role::AcademicAmir,
        Role::QiratAmir,
        Role::DawaAmir,
        Role::User,
    ];

    #[inline]
    pub const fn code(&self) -> &'static str {
        use Role::*;
        match self {
            SuperAdmin => "super_admin",
            CharityAmir => "charity_amir",
            AcademicAmir => "academic_amir",
            QiratAmir => "qirat_amir",
            DawaAmir => "dawa_amir",
            User => "user",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.code() == code)
    }

    #[inline]
    pub const fn is_admin(&self) -> bool {
        !matches!(self, Role::User)
    }

    #[inline]
    pub const fn is_super_admin(&self) -> bool {
        matches!(self, Role::SuperAdmin)
    }

    /// The sector an amir role administers.
    #[inline]
    pub const fn sector(&self) -> Option<Sector> {
        use Role::*;
        match self {
            CharityAmir => Some(Sector::Charity),
            AcademicAmir => Some(Sector::Academic),
            QiratAmir => Some(Sector::Qirat),
            DawaAmir => Some(Sector::Dawa),
            SuperAdmin | User => None,
        }
    }

    /// Whether holding `self` grants everything `other` grants.
    #[inline]
    pub fn is_superset_of(&self, other: Role) -> bool {
        self.is_super_admin() || *self == other
    }

    /// Whether `self` may enter a view restricted to `required`.
    /// An empty constraint admits every role.
    pub fn satisfies(&self, required: &[Role]) -> bool {
        required.is_empty() || required.iter().any(|r| self.is_superset_of(*r))
    }

    /// Where this role lands when it cannot enter the requested view.
    /// Total over the enumeration.
    #[inline]
    pub const fn default_route(&self) -> &'static str {
        match self {
            Role::SuperAdmin => ADMIN_ROOT,
            Role::User => PUBLIC_HOME,
            Role::CharityAmir => Sector::Charity.route(),
            Role::AcademicAmir => Sector::Academic.route(),
            Role::QiratAmir => Sector::Qirat.route(),
            Role::DawaAmir => Sector::Dawa.route(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::from_code(s.trim()).ok_or_else(|| UnknownRole(s.to_string()))
    }
}
