//! Known packaging quirks of widely-used third-party packages.
//!
//! Some packages ship conditional `require` calls for optional integrations
//! without declaring them as optional, or need files outside their own
//! directory at runtime. Each rule is keyed by package name and a semver range
//! of affected versions. Extend the table here; resolver logic never
//! special-cases package names.

use semver::{Version, VersionReq};

/// What a quirk rule changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuirkKind {
    /// Missing sub-dependencies treated as optional.
    RelaxOptional(&'static [&'static str]),
    /// Files inside the package (glob relative to the package root) never copied.
    ExcludeSubPath(&'static str),
    /// Directory relative to the package root that must be shipped with it.
    SidePath(&'static str),
}

#[derive(Debug, Clone, Copy)]
pub struct QuirkRule {
    pub package: &'static str,
    /// Semver range of affected versions.
    pub versions: &'static str,
    pub kind: QuirkKind,
}

pub const QUIRKS: &[QuirkRule] = &[
    QuirkRule {
        package: "node-fetch",
        versions: "<3.0.0",
        kind: QuirkKind::RelaxOptional(&["encoding"]),
    },
    QuirkRule {
        package: "ws",
        versions: "<7.0.0",
        kind: QuirkKind::RelaxOptional(&["bufferutil", "utf-8-validate"]),
    },
    QuirkRule {
        package: "debug",
        versions: "*",
        kind: QuirkKind::RelaxOptional(&["supports-color"]),
    },
    QuirkRule {
        package: "pg",
        versions: "*",
        kind: QuirkKind::RelaxOptional(&["pg-native"]),
    },
    QuirkRule {
        package: "mongodb",
        versions: "<4.0.0",
        kind: QuirkKind::RelaxOptional(&[
            "kerberos",
            "snappy",
            "bson-ext",
            "mongodb-client-encryption",
            "aws4",
            "saslprep",
        ]),
    },
    QuirkRule {
        package: "knex",
        versions: "*",
        kind: QuirkKind::RelaxOptional(&[
            "mysql",
            "mysql2",
            "pg",
            "pg-query-stream",
            "sqlite3",
            "better-sqlite3",
            "tedious",
            "oracledb",
        ]),
    },
    QuirkRule {
        package: "@prisma/client",
        versions: "*",
        kind: QuirkKind::RelaxOptional(&["@prisma/cli", "prisma2", "prisma"]),
    },
    QuirkRule {
        package: "@prisma/client",
        versions: "*",
        kind: QuirkKind::ExcludeSubPath("generator-build/**"),
    },
    QuirkRule {
        package: "@prisma/client",
        versions: "*",
        kind: QuirkKind::SidePath("../../.prisma"),
    },
];

impl QuirkRule {
    /// Whether this rule applies to `package` at `version`.
    ///
    /// A missing or unparsable version only matches the `*` range.
    pub fn applies_to(&self, package: &str, version: Option<&str>) -> bool {
        if self.package != package {
            return false;
        }
        let Ok(range) = VersionReq::parse(self.versions) else {
            log::warn!("Invalid quirk range '{}' for {}", self.versions, self.package);
            return false;
        };
        if range == VersionReq::STAR {
            return true;
        }
        version
            .and_then(|v| Version::parse(v).ok())
            .is_some_and(|v| range.matches(&v))
    }
}

fn matching(package: &str, version: Option<&str>) -> impl Iterator<Item = &'static QuirkRule> {
    QUIRKS
        .iter()
        .filter(move |rule| rule.applies_to(package, version))
}

/// Whether `requirer_package@version` is known to require `missing` optionally.
pub fn relaxes_optional(requirer_package: &str, version: Option<&str>, missing: &str) -> bool {
    matching(requirer_package, version).any(|rule| match rule.kind {
        QuirkKind::RelaxOptional(names) => names.contains(&missing),
        _ => false,
    })
}

/// Sub-path globs never copied out of `package`.
pub fn excluded_sub_paths(package: &str, version: Option<&str>) -> Vec<&'static str> {
    matching(package, version)
        .filter_map(|rule| match rule.kind {
            QuirkKind::ExcludeSubPath(glob) => Some(glob),
            _ => None,
        })
        .collect()
}

/// Extra directories, relative to the package root, shipped with `package`.
pub fn side_paths(package: &str, version: Option<&str>) -> Vec<&'static str> {
    matching(package, version)
        .filter_map(|rule| match rule.kind {
            QuirkKind::SidePath(path) => Some(path),
            _ => None,
        })
        .collect()
}
