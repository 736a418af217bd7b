//! Explicit schema definitions and DDL rendering.
//!
//! Tables are described as data and rendered per backend, so the generated
//! schema (including constraint names) is identical across runs and engines.
//!
//! # Constraint naming
//!
//! | kind        | pattern                       | example                            |
//! |-------------|-------------------------------|------------------------------------|
//! | primary key | `<table>_pkey`                | `users_pkey`                       |
//! | unique      | `<table>_<column...>_key`     | `policies_resource_action_key`     |
//! | index       | `<table>_<column>_idx`        | `products_name_idx`                |
//! | check       | `<table>_<name>_check`        | `products_price_check`             |
//! | foreign key | `<table>_<column>_fkey`       | `associate_roles_policies_role_id_fkey` |

use crate::models::DatabaseType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Auto-assigned surrogate key
    Id,
    BigInt,
    Double,
    Text,
    VarChar(u32),
}

impl ColumnType {
    fn sql(&self, db_type: DatabaseType) -> String {
        match (self, db_type) {
            // Must be exactly INTEGER to alias the rowid
            (Self::Id, DatabaseType::SQLite) => "INTEGER".to_string(),
            (Self::Id, DatabaseType::PostgreSQL) => {
                "BIGINT GENERATED BY DEFAULT AS IDENTITY".to_string()
            }
            (Self::BigInt, _) => "BIGINT".to_string(),
            (Self::Double, _) => "DOUBLE PRECISION".to_string(),
            (Self::Text, _) => "TEXT".to_string(),
            (Self::VarChar(n), _) => format!("VARCHAR({n})"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnDef {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
    pub default: Option<&'static str>,
}

const fn column(name: &'static str, ty: ColumnType) -> ColumnDef {
    ColumnDef {
        name,
        ty,
        nullable: false,
        default: None,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ForeignKeyDef {
    pub column: &'static str,
    pub references: (&'static str, &'static str),
    pub on_delete_cascade: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct CheckDef {
    pub name: &'static str,
    pub expression: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct TableDef {
    pub name: &'static str,
    pub columns: &'static [ColumnDef],
    pub primary_key: &'static [&'static str],
    pub uniques: &'static [&'static [&'static str]],
    pub indexes: &'static [&'static str],
    pub checks: &'static [CheckDef],
    pub foreign_keys: &'static [ForeignKeyDef],
}

pub const USERS: TableDef = TableDef {
    name: "users",
    columns: &[
        column("id", ColumnType::Id),
        column("name", ColumnType::VarChar(50)),
        column("email", ColumnType::VarChar(100)),
    ],
    primary_key: &["id"],
    uniques: &[&["email"]],
    indexes: &[],
    checks: &[],
    foreign_keys: &[],
};

pub const PRODUCTS: TableDef = TableDef {
    name: "products",
    columns: &[
        column("id", ColumnType::Id),
        column("name", ColumnType::Text),
        column("price", ColumnType::Double),
        column("sku", ColumnType::Text),
        ColumnDef {
            nullable: true,
            ..column("description", ColumnType::Text)
        },
        ColumnDef {
            default: Some("0"),
            ..column("inventory", ColumnType::BigInt)
        },
    ],
    primary_key: &["id"],
    uniques: &[&["sku"]],
    indexes: &["name"],
    checks: &[
        CheckDef {
            name: "price",
            expression: "price >= 0",
        },
        CheckDef {
            name: "inventory",
            expression: "inventory >= 0",
        },
    ],
    foreign_keys: &[],
};

pub const ROLES: TableDef = TableDef {
    name: "roles",
    columns: &[column("id", ColumnType::Id), column("name", ColumnType::Text)],
    primary_key: &["id"],
    uniques: &[&["name"]],
    indexes: &[],
    checks: &[],
    foreign_keys: &[],
};

pub const POLICIES: TableDef = TableDef {
    name: "policies",
    columns: &[
        column("id", ColumnType::Id),
        column("resource", ColumnType::VarChar(64)),
        column("action", ColumnType::VarChar(16)),
    ],
    primary_key: &["id"],
    uniques: &[&["resource", "action"]],
    indexes: &[],
    checks: &[CheckDef {
        name: "action",
        expression: "action IN ('create', 'update', 'delete', 'read')",
    }],
    foreign_keys: &[],
};

pub const ROLE_POLICIES: TableDef = TableDef {
    name: "associate_roles_policies",
    columns: &[
        column("role_id", ColumnType::BigInt),
        column("policy_id", ColumnType::BigInt),
    ],
    primary_key: &["role_id", "policy_id"],
    uniques: &[],
    indexes: &["policy_id"],
    checks: &[],
    foreign_keys: &[
        ForeignKeyDef {
            column: "role_id",
            references: ("roles", "id"),
            on_delete_cascade: true,
        },
        ForeignKeyDef {
            column: "policy_id",
            references: ("policies", "id"),
            on_delete_cascade: true,
        },
    ],
};

/// All tables in creation order (referenced tables first).
pub const TABLES: &[TableDef] = &[USERS, PRODUCTS, ROLES, POLICIES, ROLE_POLICIES];

pub fn primary_key_name(table: &str) -> String {
    format!("{table}_pkey")
}

pub fn unique_name(table: &str, columns: &[&str]) -> String {
    format!("{table}_{}_key", columns.join("_"))
}

pub fn index_name(table: &str, column: &str) -> String {
    format!("{table}_{column}_idx")
}

pub fn check_name(table: &str, name: &str) -> String {
    format!("{table}_{name}_check")
}

pub fn foreign_key_name(table: &str, column: &str) -> String {
    format!("{table}_{column}_fkey")
}

impl TableDef {
    /// Render `CREATE TABLE` plus its indexes. Every statement is idempotent.
    pub fn create_statements(&self, db_type: DatabaseType) -> Vec<String> {
        let mut lines: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let mut line = format!("{} {}", c.name, c.ty.sql(db_type));
                if !c.nullable {
                    line.push_str(" NOT NULL");
                }
                if let Some(default) = c.default {
                    line.push_str(&format!(" DEFAULT {default}"));
                }
                line
            })
            .collect();

        lines.push(format!(
            "CONSTRAINT {} PRIMARY KEY ({})",
            primary_key_name(self.name),
            self.primary_key.join(", ")
        ));
        for columns in self.uniques {
            lines.push(format!(
                "CONSTRAINT {} UNIQUE ({})",
                unique_name(self.name, columns),
                columns.join(", ")
            ));
        }
        for check in self.checks {
            lines.push(format!(
                "CONSTRAINT {} CHECK ({})",
                check_name(self.name, check.name),
                check.expression
            ));
        }
        for fk in self.foreign_keys {
            let (table, column) = fk.references;
            let mut line = format!(
                "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
                foreign_key_name(self.name, fk.column),
                fk.column,
                table,
                column
            );
            if fk.on_delete_cascade {
                line.push_str(" ON DELETE CASCADE");
            }
            lines.push(line);
        }

        let mut statements = vec![format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            self.name,
            lines.join(",\n    ")
        )];
        for column in self.indexes {
            statements.push(format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                index_name(self.name, column),
                self.name,
                column
            ));
        }
        statements
    }
}

/// DDL for the whole schema, in dependency order.
pub fn create_statements(db_type: DatabaseType) -> Vec<String> {
    TABLES
        .iter()
        .flat_map(|table| table.create_statements(db_type))
        .collect()
}
