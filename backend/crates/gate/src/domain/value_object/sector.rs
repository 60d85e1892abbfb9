//! Administrative sectors and the fixed admin routes

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::role::Role;

/// Root of the admin area, reserved for super admins
pub const ADMIN_ROOT: &str = "/admin";

/// Public landing page
pub const PUBLIC_HOME: &str = "/";

/// An administrative area with its own amir role and landing route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sector {
    #[display("charity")]
    Charity,
    #[display("academic")]
    Academic,
    #[display("qirat")]
    Qirat,
    #[display("dawa")]
    Dawa,
}

impl Sector {
    pub const ALL: [Sector; 4] = [
        Sector::Charity,
        Sector::Academic,
        Sector::Qirat,
        Sector::Dawa,
    ];

    #[inline]
    pub const fn slug(&self) -> &'static str {
        match self {
            Sector::Charity => "charity",
            Sector::Academic => "academic",
            Sector::Qirat => "qirat",
            Sector::Dawa => "dawa",
        }
    }

    #[inline]
    pub const fn amir_role(&self) -> Role {
        match self {
            Sector::Charity => Role::CharityAmir,
            Sector::Academic => Role::AcademicAmir,
            Sector::Qirat => Role::QiratAmir,
            Sector::Dawa => Role::DawaAmir,
        }
    }

    /// The sector's own admin area
    #[inline]
    pub const fn route(&self) -> &'static str {
        match self {
            Sector::Charity => "/admin/charity",
            Sector::Academic => "/admin/academic",
            Sector::Qirat => "/admin/qirat",
            Sector::Dawa => "/admin/dawa",
        }
    }
}

impl FromStr for Sector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Sector::ALL
            .into_iter()
            .find(|sector| sector.slug().eq_ignore_ascii_case(s))
            .ok_or_else(|| s.to_string())
    }
}
