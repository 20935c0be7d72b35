//! Pure SQL-string construction for the common DDL/DML shapes. Every
//! function here is side-effect-free: identical inputs always produce
//! byte-identical output, which is what the snapshot tests below rely on.
//!
//! `update`/`delete` interpolate their `where` clause verbatim — callers
//! are responsible for making sure it's safe, exactly as CrateDB's own
//! drivers document.

use bon::Builder;

use crate::error::{Error, Result};

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `"schema"."table"`, or just `"table"` with no schema qualifier.
fn quote_table(table: &str) -> String {
    table
        .split('.')
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(".")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectMode {
    Strict,
    Dynamic,
    Ignored,
}

impl ObjectMode {
    fn as_sql(self) -> &'static str {
        match self {
            ObjectMode::Strict => "STRICT",
            ObjectMode::Dynamic => "DYNAMIC",
            ObjectMode::Ignored => "IGNORED",
        }
    }
}

#[derive(Debug, Clone)]
pub enum ColumnDef {
    Scalar {
        name: String,
        sql_type: String,
        not_null: bool,
        default_value: Option<String>,
        generated_always: Option<String>,
        stored: bool,
        primary_key: bool,
    },
    Object {
        name: String,
        mode: Option<ObjectMode>,
        properties: Vec<ColumnDef>,
    },
}

impl ColumnDef {
    pub fn scalar(name: impl Into<String>, sql_type: impl Into<String>) -> ScalarColumnBuilder {
        ScalarColumnBuilder {
            name: name.into(),
            sql_type: sql_type.into(),
            not_null: false,
            default_value: None,
            generated_always: None,
            stored: false,
            primary_key: false,
        }
    }

    pub fn object(name: impl Into<String>) -> ObjectColumnBuilder {
        ObjectColumnBuilder {
            name: name.into(),
            mode: None,
            properties: Vec::new(),
        }
    }

    fn name(&self) -> &str {
        match self {
            ColumnDef::Scalar { name, .. } => name,
            ColumnDef::Object { name, .. } => name,
        }
    }

    fn to_sql(&self) -> Result<String> {
        match self {
            ColumnDef::Scalar {
                name,
                sql_type,
                not_null,
                default_value,
                generated_always,
                stored,
                primary_key,
                ..
            } => {
                if default_value.is_some() && generated_always.is_some() {
                    return Err(Error::ValidationError(format!(
                        "column \"{name}\" cannot have both a default value and a generated expression"
                    )));
                }
                let mut sql = format!("{} {}", quote_ident(name), sql_type);
                if *not_null {
                    sql.push_str(" NOT NULL");
                }
                if let Some(default) = default_value {
                    sql.push_str(&format!(" DEFAULT {default}"));
                }
                if let Some(expr) = generated_always {
                    sql.push_str(&format!(" GENERATED ALWAYS AS {expr}"));
                    if *stored {
                        sql.push_str(" STORED");
                    }
                }
                if *primary_key {
                    sql.push_str(" PRIMARY KEY");
                }
                Ok(sql)
            }
            ColumnDef::Object {
                name,
                mode,
                properties,
            } => {
                let mut sql = quote_ident(name);
                sql.push_str(" OBJECT");
                if let Some(mode) = mode {
                    sql.push_str(&format!("({})", mode.as_sql()));
                }
                if !properties.is_empty() {
                    let children = properties
                        .iter()
                        .map(ColumnDef::to_sql)
                        .collect::<Result<Vec<_>>>()?
                        .join(", ");
                    sql.push_str(&format!(" AS ({children})"));
                }
                Ok(sql)
            }
        }
    }
}

pub struct ScalarColumnBuilder {
    name: String,
    sql_type: String,
    not_null: bool,
    default_value: Option<String>,
    generated_always: Option<String>,
    stored: bool,
    primary_key: bool,
}

impl ScalarColumnBuilder {
    pub fn not_null(mut self, value: bool) -> Self {
        self.not_null = value;
        self
    }
    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }
    pub fn generated_always(mut self, expr: impl Into<String>) -> Self {
        self.generated_always = Some(expr.into());
        self
    }
    pub fn stored(mut self, value: bool) -> Self {
        self.stored = value;
        self
    }
    pub fn primary_key(mut self, value: bool) -> Self {
        self.primary_key = value;
        self
    }
    pub fn build(self) -> ColumnDef {
        ColumnDef::Scalar {
            name: self.name,
            sql_type: self.sql_type,
            not_null: self.not_null,
            default_value: self.default_value,
            generated_always: self.generated_always,
            stored: self.stored,
            primary_key: self.primary_key,
        }
    }
}

pub struct ObjectColumnBuilder {
    name: String,
    mode: Option<ObjectMode>,
    properties: Vec<ColumnDef>,
}

impl ObjectColumnBuilder {
    pub fn mode(mut self, mode: ObjectMode) -> Self {
        self.mode = Some(mode);
        self
    }
    pub fn property(mut self, column: ColumnDef) -> Self {
        self.properties.push(column);
        self
    }
    pub fn build(self) -> ColumnDef {
        ColumnDef::Object {
            name: self.name,
            mode: self.mode,
            properties: self.properties,
        }
    }
}

#[derive(Debug, Clone, Default, Builder)]
pub struct CreateTableOptions {
    #[builder(default)]
    pub primary_keys: Vec<String>,
    #[builder(default)]
    pub partitioned_by: Vec<String>,
    pub clustered_by: Option<(String, u32)>,
    #[builder(into)]
    pub number_of_replicas: Option<String>,
}

pub fn create_table(table: &str, columns: &[ColumnDef], options: &CreateTableOptions) -> Result<String> {
    if columns.is_empty() {
        return Err(Error::ValidationError(
            "createTable requires at least one column".into(),
        ));
    }
    let mut parts = columns
        .iter()
        .map(ColumnDef::to_sql)
        .collect::<Result<Vec<_>>>()?;

    if !options.primary_keys.is_empty() {
        let pks = options
            .primary_keys
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        parts.push(format!("PRIMARY KEY({pks})"));
    }

    let mut sql = format!("CREATE TABLE {} ({});", quote_table(table), parts.join(", "));
    // The trailing `;` above must become the statement terminator, so build
    // up the clauses before it instead of appending after.
    sql.truncate(sql.len() - 1);

    if !options.partitioned_by.is_empty() {
        let cols = options
            .partitioned_by
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        sql.push_str(&format!(" PARTITIONED BY ({cols})"));
    }

    if let Some((column, shards)) = &options.clustered_by {
        sql.push_str(&format!(
            " CLUSTERED BY ({}) INTO {} SHARDS",
            quote_ident(column),
            shards
        ));
    }

    if let Some(replicas) = &options.number_of_replicas {
        sql.push_str(&format!(" WITH (number_of_replicas='{replicas}')"));
    }

    sql.push(';');
    Ok(sql)
}

pub fn insert(table: &str, keys: &[String], primary_keys: Option<&[String]>) -> String {
    let columns = keys
        .iter()
        .map(|k| quote_ident(k))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = keys.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_table(table),
        columns,
        placeholders
    );

    match primary_keys {
        Some(pks) if !pks.is_empty() => {
            let conflict_cols = pks.iter().map(|k| quote_ident(k)).collect::<Vec<_>>().join(", ");
            let assignments = keys
                .iter()
                .filter(|k| !pks.contains(k))
                .map(|k| {
                    let q = quote_ident(k);
                    format!("{q} = excluded.{q}")
                })
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!(" ON CONFLICT ({conflict_cols}) DO UPDATE SET {assignments}"));
        }
        _ => sql.push_str(" ON CONFLICT DO NOTHING"),
    }

    sql.push(';');
    sql
}

pub fn update(table: &str, values: &[String], where_clause: &str) -> String {
    let assignments = values
        .iter()
        .map(|c| format!("{} = ?", quote_ident(c)))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "UPDATE {} SET {} WHERE {};",
        quote_table(table),
        assignments,
        where_clause
    )
}

pub fn delete(table: &str, where_clause: &str) -> String {
    format!("DELETE FROM {} WHERE {};", quote_table(table), where_clause)
}

pub fn drop_table(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {};", quote_table(table))
}

pub fn refresh(table: &str) -> String {
    format!("REFRESH TABLE {};", quote_table(table))
}

#[derive(Debug, Clone, Copy)]
pub enum OptimizeValue<'a> {
    Text(&'a str),
    Number(f64),
}

impl std::fmt::Display for OptimizeValue<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptimizeValue::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            OptimizeValue::Number(n) => write!(f, "{n}"),
        }
    }
}

pub fn optimize(
    table: &str,
    options: Option<&[(&str, OptimizeValue)]>,
    partitions: Option<&[(&str, OptimizeValue)]>,
) -> String {
    let mut sql = format!("OPTIMIZE TABLE {}", quote_table(table));

    if let Some(options) = options.filter(|o| !o.is_empty()) {
        let kvs = options
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ");
        sql.push_str(&format!(" WITH ({kvs})"));
    }

    if let Some(partitions) = partitions.filter(|p| !p.is_empty()) {
        let kvs = partitions
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ");
        sql.push_str(&format!(" PARTITION ({kvs})"));
    }

    sql.push(';');
    sql
}

/// Fixed probe against `information_schema.key_column_usage` /
/// `table_constraints`, in `ordinal_position` order. Returns the SQL text
/// and the two positional parameters `(schema, table)` a caller should
/// bind.
pub const GET_PRIMARY_KEYS_SQL: &str = "SELECT kcu.column_name \
FROM information_schema.key_column_usage kcu \
JOIN information_schema.table_constraints tc \
  ON kcu.constraint_name = tc.constraint_name \
 AND kcu.table_schema = tc.table_schema \
 AND kcu.table_name = tc.table_name \
WHERE tc.constraint_type = 'PRIMARY KEY' \
  AND kcu.table_schema = ? AND kcu.table_name = ? \
ORDER BY kcu.ordinal_position;";

pub fn get_primary_keys_args(schema: &str, table: &str) -> Vec<serde_json::Value> {
    vec![serde_json::Value::from(schema), serde_json::Value::from(table)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_without_primary_keys_is_do_nothing() {
        let keys = vec!["id".to_string(), "name".to_string()];
        let with_empty = insert("t", &keys, Some(&[]));
        let with_none = insert("t", &keys, None);
        assert_eq!(with_empty, with_none);
        assert!(with_empty.ends_with("ON CONFLICT DO NOTHING;"));
    }

    #[test]
    fn insert_with_primary_keys_upserts() {
        let keys = vec!["id".to_string(), "name".to_string()];
        let sql = insert("t", &keys, Some(&["id".to_string()]));
        assert_eq!(
            sql,
            "INSERT INTO \"t\" (\"id\", \"name\") VALUES (?, ?) ON CONFLICT (\"id\") DO UPDATE SET \"name\" = excluded.\"name\";"
        );
    }

    #[test]
    fn create_table_is_deterministic() {
        let columns = vec![
            ColumnDef::scalar("id", "INTEGER").primary_key(true).build(),
            ColumnDef::scalar("name", "TEXT").build(),
        ];
        let options = CreateTableOptions::builder().build();
        let a = create_table("t", &columns, &options).unwrap();
        let b = create_table("t", &columns, &options).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            a,
            "CREATE TABLE \"t\" (\"id\" INTEGER PRIMARY KEY, \"name\" TEXT);"
        );
    }

    #[test]
    fn create_table_nested_object_column() {
        let columns = vec![ColumnDef::object("payload")
            .mode(ObjectMode::Strict)
            .property(ColumnDef::scalar("a", "TEXT").build())
            .property(ColumnDef::scalar("b", "INTEGER").build())
            .build()];
        let options = CreateTableOptions::builder().build();
        let sql = create_table("t", &columns, &options).unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE \"t\" (\"payload\" OBJECT(STRICT) AS (\"a\" TEXT, \"b\" INTEGER));"
        );
    }

    #[test]
    fn create_table_rejects_default_and_generated_together() {
        let columns = vec![ColumnDef::scalar("a", "INTEGER")
            .default_value("1")
            .generated_always("1 + 1")
            .build()];
        let options = CreateTableOptions::builder().build();
        assert!(create_table("t", &columns, &options).is_err());
    }

    #[test]
    fn create_table_with_partitioning_and_clustering() {
        let columns = vec![ColumnDef::scalar("id", "INTEGER").build()];
        let options = CreateTableOptions::builder()
            .partitioned_by(vec!["id".to_string()])
            .clustered_by(("id".to_string(), 4))
            .number_of_replicas("0-1")
            .build();
        let sql = create_table("t", &columns, &options).unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE \"t\" (\"id\" INTEGER) PARTITIONED BY (\"id\") CLUSTERED BY (\"id\") INTO 4 SHARDS WITH (number_of_replicas='0-1');"
        );
    }

    #[test]
    fn qualified_table_name_quotes_each_part() {
        assert_eq!(drop_table("doc.t"), "DROP TABLE IF EXISTS \"doc\".\"t\";");
    }

    #[test]
    fn optimize_quotes_string_values_but_not_numbers() {
        let sql = optimize(
            "t",
            Some(&[("max_num_segments", OptimizeValue::Number(1.0))]),
            Some(&[("date", OptimizeValue::Text("2024-01-01"))]),
        );
        assert_eq!(
            sql,
            "OPTIMIZE TABLE \"t\" WITH (max_num_segments=1) PARTITION (date='2024-01-01');"
        );
    }

    #[test]
    fn update_and_delete_interpolate_where_verbatim() {
        assert_eq!(
            update("t", &["name".to_string()], "id = 1"),
            "UPDATE \"t\" SET \"name\" = ? WHERE id = 1;"
        );
        assert_eq!(delete("t", "id = 1"), "DELETE FROM \"t\" WHERE id = 1;");
    }
}
