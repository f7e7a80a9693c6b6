//! Logical table names and per-dialect physical name resolution.

use crate::config::SchemaMapEntry;

/// Which database engine a physical name is being produced for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// SQL Server: bracket-qualified, case preserved.
    Mssql,
    /// PostgreSQL: dot-qualified, lowercased, unquoted.
    Postgres,
}

/// A schema-qualified logical table name as the caller selected it.
///
/// Valid only if the table exists in both databases (case-insensitive name
/// match); the engine checks that, not this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub schema: Option<String>,
    pub name: String,
}

impl TableSpec {
    /// Parse `schema.table`, `[schema].[table]`, `"schema"."table"`, or a
    /// bare table name. Brackets, quotes, and surrounding whitespace are
    /// stripped.
    pub fn parse(raw: &str) -> Self {
        let cleaned: String = raw
            .chars()
            .filter(|c| !matches!(c, '[' | ']' | '"'))
            .collect();
        let cleaned = cleaned.trim();
        match cleaned.split_once('.') {
            Some((schema, name)) => Self {
                schema: Some(schema.trim().to_string()),
                name: name.trim().to_string(),
            },
            None => Self {
                schema: None,
                name: cleaned.to_string(),
            },
        }
    }

    /// Lowercased bare table name, used for existence intersection.
    pub fn name_lower(&self) -> String {
        self.name.to_lowercase()
    }
}

impl std::fmt::Display for TableSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.schema {
            Some(s) => write!(f, "{}.{}", s, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Resolves logical table names to dialect-correct physical names using the
/// configured schema pairs.
///
/// Lookup order: the pair whose side matches the spec's schema, then the
/// first configured pair, then an unqualified (MSSQL) or `public`-schema
/// (PostgreSQL) name. Case folding must stay consistent per dialect or key
/// comparisons across the two databases spuriously mismatch.
#[derive(Debug, Clone, Default)]
pub struct SchemaMapper {
    map: Vec<SchemaMapEntry>,
}

impl SchemaMapper {
    pub fn new(map: Vec<SchemaMapEntry>) -> Self {
        Self { map }
    }

    /// Schema name to use for this spec on the given side.
    fn schema_for(&self, spec: &TableSpec, dialect: Dialect) -> Option<String> {
        // A schema already present on the spec is mapped through the pair
        // list; an unqualified spec falls back to the first configured pair.
        if let Some(spec_schema) = &spec.schema {
            for entry in &self.map {
                let (own, other) = match dialect {
                    Dialect::Mssql => (&entry.source_schema, &entry.target_schema),
                    Dialect::Postgres => (&entry.target_schema, &entry.source_schema),
                };
                if own.eq_ignore_ascii_case(spec_schema) || other.eq_ignore_ascii_case(spec_schema)
                {
                    return Some(own.clone());
                }
            }
            return Some(spec_schema.clone());
        }
        self.map.first().map(|entry| match dialect {
            Dialect::Mssql => entry.source_schema.clone(),
            Dialect::Postgres => entry.target_schema.clone(),
        })
    }

    /// Resolve to a physical, dialect-correct qualified name.
    pub fn resolve(&self, spec: &TableSpec, dialect: Dialect) -> String {
        let schema = self.schema_for(spec, dialect);
        match dialect {
            Dialect::Mssql => match schema {
                Some(s) => format!("[{}].[{}]", s, spec.name),
                None => format!("[{}]", spec.name),
            },
            Dialect::Postgres => {
                let s = schema.unwrap_or_else(|| "public".to_string()).to_lowercase();
                format!("{}.{}", s, spec.name.to_lowercase())
            }
        }
    }

    /// Source-side schema names to enumerate when listing tables.
    pub fn source_schemas(&self) -> Vec<String> {
        self.map.iter().map(|e| e.source_schema.clone()).collect()
    }

    /// Target-side schema names to enumerate when listing tables.
    pub fn target_schemas(&self) -> Vec<String> {
        self.map.iter().map(|e| e.target_schema.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper() -> SchemaMapper {
        SchemaMapper::new(vec![
            SchemaMapEntry {
                source_schema: "dbo".into(),
                target_schema: "public".into(),
            },
            SchemaMapEntry {
                source_schema: "Sales".into(),
                target_schema: "sales".into(),
            },
        ])
    }

    #[test]
    fn parse_strips_quoting() {
        assert_eq!(
            TableSpec::parse("[dbo].[Orders]"),
            TableSpec {
                schema: Some("dbo".into()),
                name: "Orders".into()
            }
        );
        assert_eq!(
            TableSpec::parse(" \"public\".\"orders\" "),
            TableSpec {
                schema: Some("public".into()),
                name: "orders".into()
            }
        );
        assert_eq!(TableSpec::parse("orders").schema, None);
    }

    #[test]
    fn resolve_mssql_brackets() {
        let spec = TableSpec::parse("Sales.Orders");
        assert_eq!(mapper().resolve(&spec, Dialect::Mssql), "[Sales].[Orders]");
    }

    #[test]
    fn resolve_pg_lowercase() {
        let spec = TableSpec::parse("Sales.Orders");
        assert_eq!(mapper().resolve(&spec, Dialect::Postgres), "sales.orders");
    }

    #[test]
    fn unqualified_uses_first_pair() {
        let spec = TableSpec::parse("Orders");
        assert_eq!(mapper().resolve(&spec, Dialect::Mssql), "[dbo].[Orders]");
        assert_eq!(mapper().resolve(&spec, Dialect::Postgres), "public.orders");
    }

    #[test]
    fn no_map_falls_back_to_defaults() {
        let m = SchemaMapper::default();
        let spec = TableSpec::parse("Orders");
        assert_eq!(m.resolve(&spec, Dialect::Mssql), "[Orders]");
        assert_eq!(m.resolve(&spec, Dialect::Postgres), "public.orders");
    }

    #[test]
    fn cross_side_schema_is_mapped() {
        // Caller selected the table using the PG-side schema name.
        let spec = TableSpec::parse("public.orders");
        assert_eq!(mapper().resolve(&spec, Dialect::Mssql), "[dbo].[orders]");
    }
}
