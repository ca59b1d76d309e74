//! How to write a NULL when neither a custom handler nor a column type is
//! known.
//!
//! Some drivers reject a typed NULL without a concrete type and need a
//! generic "set object to null" call; others want a specific fallback type.
//! The decision is read from connection metadata once, through a
//! data-driven table of product/driver name prefixes, and cached.

use super::statement::{ConnectionMetadata, StatementHandle};
use crate::core::SqlType;
use std::sync::OnceLock;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullWrite {
    SetObjectNull,
    TypedNull(SqlType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataField {
    DatabaseProduct,
    Driver,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorRule {
    pub field: MetadataField,
    pub prefix: String,
    pub write: NullWrite,
}

impl VendorRule {
    pub fn new(field: MetadataField, prefix: impl Into<String>, write: NullWrite) -> Self {
        Self {
            field,
            prefix: prefix.into(),
            write,
        }
    }

    fn matches(&self, meta: &ConnectionMetadata) -> bool {
        let subject = match self.field {
            MetadataField::DatabaseProduct => &meta.database_product_name,
            MetadataField::Driver => &meta.driver_name,
        };
        subject.starts_with(&self.prefix)
    }
}

/// Ordered rules; the first match wins, otherwise `fallback` applies.
#[derive(Debug, Clone)]
pub struct VendorQuirks {
    rules: Vec<VendorRule>,
    fallback: NullWrite,
}

impl VendorQuirks {
    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            fallback: NullWrite::TypedNull(SqlType::Null),
        }
    }

    pub fn with_rule(mut self, rule: VendorRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn fallback(&self) -> NullWrite {
        self.fallback
    }

    pub fn decide(&self, meta: &ConnectionMetadata) -> NullWrite {
        self.rules
            .iter()
            .find(|rule| rule.matches(meta))
            .map_or(self.fallback, |rule| rule.write)
    }
}

impl Default for VendorQuirks {
    fn default() -> Self {
        use MetadataField::{DatabaseProduct, Driver};
        let varchar = NullWrite::TypedNull(SqlType::Varchar);

        Self::empty()
            .with_rule(VendorRule::new(DatabaseProduct, "Informix", NullWrite::SetObjectNull))
            .with_rule(VendorRule::new(Driver, "Microsoft SQL Server", NullWrite::SetObjectNull))
            .with_rule(VendorRule::new(DatabaseProduct, "DB2", varchar))
            .with_rule(VendorRule::new(Driver, "jConnect", varchar))
            .with_rule(VendorRule::new(Driver, "SQLServer", varchar))
            .with_rule(VendorRule::new(Driver, "Apache Derby Embedded", varchar))
    }
}

/// Lazily computed, shared null-write decision.
///
/// Concurrent first calls may each read the metadata; the first stored
/// decision is the one every caller observes.
#[derive(Debug)]
pub struct NullValueProbe {
    quirks: VendorQuirks,
    decision: OnceLock<NullWrite>,
}

impl NullValueProbe {
    pub fn new(quirks: VendorQuirks) -> Self {
        Self {
            quirks,
            decision: OnceLock::new(),
        }
    }

    pub fn decision(&self) -> Option<NullWrite> {
        self.decision.get().copied()
    }

    pub fn resolve(&self, stmt: &dyn StatementHandle) -> NullWrite {
        if let Some(decided) = self.decision.get() {
            return *decided;
        }

        let decided = match stmt.connection_metadata() {
            Ok(meta) => {
                let write = self.quirks.decide(&meta);
                debug!(
                    product = %meta.database_product_name,
                    driver = %meta.driver_name,
                    ?write,
                    "Resolved null write strategy"
                );
                write
            }
            Err(err) => {
                debug!("Could not check database or driver name: {}", err);
                self.quirks.fallback()
            }
        };

        *self.decision.get_or_init(|| decided)
    }
}

impl Default for NullValueProbe {
    fn default() -> Self {
        Self::new(VendorQuirks::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(product: &str, driver: &str) -> ConnectionMetadata {
        ConnectionMetadata::new(product, driver)
    }

    #[test]
    fn test_default_table() {
        let quirks = VendorQuirks::default();
        assert_eq!(
            quirks.decide(&meta("Informix Dynamic Server", "x")),
            NullWrite::SetObjectNull
        );
        assert_eq!(
            quirks.decide(&meta("x", "Microsoft SQL Server JDBC Driver")),
            NullWrite::SetObjectNull
        );
        assert_eq!(
            quirks.decide(&meta("DB2/LINUXX8664", "x")),
            NullWrite::TypedNull(SqlType::Varchar)
        );
        assert_eq!(
            quirks.decide(&meta("PostgreSQL", "PostgreSQL JDBC Driver")),
            NullWrite::TypedNull(SqlType::Null)
        );
    }

    #[test]
    fn test_custom_rule_first_match_wins() {
        let quirks = VendorQuirks::empty()
            .with_rule(VendorRule::new(
                MetadataField::Driver,
                "acme",
                NullWrite::TypedNull(SqlType::Integer),
            ))
            .with_rule(VendorRule::new(
                MetadataField::Driver,
                "acme",
                NullWrite::SetObjectNull,
            ));
        assert_eq!(
            quirks.decide(&meta("", "acme-odbc")),
            NullWrite::TypedNull(SqlType::Integer)
        );
    }
}
