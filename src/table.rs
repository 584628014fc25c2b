//! Table model
//!
//! Derives the SQL tables backing a schema:
//!
//! - one type table per concrete type, with a column for every column-backed
//!   attribute including inherited and mixin attributes
//! - one join table `JOIN_<HOLDER>` per holder with subtypes and per mixin,
//!   giving every member record an id in that holder's id space
//! - one table `UQ_<HOLDER>_<n>` per unique constraint, holding the
//!   constrained values of all member records

use std::collections::BTreeMap;

use tracing::info;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::mediator::{MediatorEnv, MediatorRegistry};
use crate::schema::Schema;
use crate::sql::{SqlType, to_sql_name};
use crate::types::Attribute;

/// Column name of an attribute
pub fn column_name(attribute: &str) -> String {
    to_sql_name(attribute)
}

pub fn type_table_name(config: &EngineConfig, holder: &str) -> String {
    config.table_name(&to_sql_name(holder))
}

pub fn join_table_name(config: &EngineConfig, holder: &str) -> String {
    config.table_name(&format!("JOIN_{}", to_sql_name(holder)))
}

pub fn unique_table_name(config: &EngineConfig, holder: &str, index: usize) -> String {
    config.table_name(&format!("UQ_{}_{}", to_sql_name(holder), index))
}

/// Column of join and unique-constraint tables holding a member's own id
pub fn concrete_id_column(concrete: &str) -> String {
    format!("{}_ID", to_sql_name(concrete))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub attribute: String,
    pub name: String,
    pub sql_type: SqlType,
    /// Type name used in DDL
    pub ddl_type: String,
    pub mandatory: bool,
}

#[derive(Debug, Clone)]
pub struct TypeTable {
    pub holder: String,
    pub name: String,
    pub columns: Vec<Column>,
}

impl TypeTable {
    pub fn column(&self, attribute: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.attribute == attribute)
    }
}

#[derive(Debug, Clone)]
pub struct JoinTable {
    pub holder: String,
    pub name: String,
    /// Concrete types registered in this join table
    pub members: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct UniqueConstraintTable {
    pub holder: String,
    pub index: usize,
    pub name: String,
    pub columns: Vec<Column>,
    pub members: Vec<String>,
}

impl UniqueConstraintTable {
    pub fn covers(&self, attribute: &str) -> bool {
        self.columns.iter().any(|c| c.attribute == attribute)
    }
}

/// All tables of a schema
#[derive(Debug, Clone)]
pub struct TableRegistry {
    types: BTreeMap<String, TypeTable>,
    joins: BTreeMap<String, JoinTable>,
    uniques: Vec<UniqueConstraintTable>,
    /// Join holders per concrete type, in registration order
    memberships: BTreeMap<String, Vec<String>>,
}

impl TableRegistry {
    pub fn build(
        schema: &Schema,
        mediators: &MediatorRegistry,
        config: &EngineConfig,
    ) -> Result<Self> {
        let env = MediatorEnv { schema, config };
        let column_for = |attribute: &Attribute| -> Result<Option<Column>> {
            let mediator = mediators.for_attribute(attribute)?;
            if !mediator.requires_column_mapping() {
                return Ok(None);
            }
            Ok(Some(Column {
                attribute: attribute.name.clone(),
                name: column_name(&attribute.name),
                sql_type: mediator.column_type(&env, attribute)?,
                ddl_type: mediator.column_sql_type(&env, attribute)?,
                mandatory: attribute.mandatory,
            }))
        };

        let mut types = BTreeMap::new();
        let mut joins = BTreeMap::new();
        let mut uniques = Vec::new();
        let mut memberships = BTreeMap::new();

        for holder in schema.holders() {
            if holder.is_concrete() {
                let mut columns = Vec::new();
                for attribute in schema.all_attributes(&holder.name) {
                    if let Some(column) = column_for(attribute)? {
                        if column.name == config.id_column {
                            return Err(EngineError::schema(format!(
                                "Attribute '{}.{}' collides with the id column",
                                holder.name, attribute.name
                            )));
                        }
                        columns.push(column);
                    }
                }
                types.insert(
                    holder.name.clone(),
                    TypeTable {
                        holder: holder.name.clone(),
                        name: type_table_name(config, &holder.name),
                        columns,
                    },
                );
                memberships.insert(holder.name.clone(), schema.join_holders_of(&holder.name));
            }

            if schema.requires_join_table(&holder.name) {
                joins.insert(
                    holder.name.clone(),
                    JoinTable {
                        holder: holder.name.clone(),
                        name: join_table_name(config, &holder.name),
                        members: schema.concrete_types_of(&holder.name),
                    },
                );
            }

            for (index, constraint) in holder.unique_constraints.iter().enumerate() {
                let mut columns = Vec::new();
                for name in &constraint.attributes {
                    let attribute = schema.require_attribute(&holder.name, name)?;
                    let column = column_for(attribute)?.ok_or_else(|| {
                        EngineError::schema(format!(
                            "Unique constraint on '{}' uses attribute '{}' which has no column",
                            holder.name, name
                        ))
                    })?;
                    columns.push(column);
                }
                uniques.push(UniqueConstraintTable {
                    holder: holder.name.clone(),
                    index,
                    name: unique_table_name(config, &holder.name, index),
                    columns,
                    members: schema.concrete_types_of(&holder.name),
                });
            }
        }

        info!(
            type_tables = types.len(),
            join_tables = joins.len(),
            unique_tables = uniques.len(),
            "Built table registry"
        );

        Ok(Self {
            types,
            joins,
            uniques,
            memberships,
        })
    }

    pub fn type_table(&self, holder: &str) -> Result<&TypeTable> {
        self.types.get(holder).ok_or_else(|| {
            EngineError::schema(format!("'{}' is not a concrete type with a table", holder))
        })
    }

    pub fn join_table(&self, holder: &str) -> Option<&JoinTable> {
        self.joins.get(holder)
    }

    /// Join tables a record of `concrete` is registered in
    pub fn join_tables_of(&self, concrete: &str) -> Vec<&JoinTable> {
        self.memberships
            .get(concrete)
            .map(|holders| holders.iter().filter_map(|h| self.joins.get(h)).collect())
            .unwrap_or_default()
    }

    /// Unique-constraint tables a record of `concrete` has a row in
    pub fn unique_tables_of(&self, concrete: &str) -> Vec<&UniqueConstraintTable> {
        self.uniques
            .iter()
            .filter(|u| u.members.iter().any(|m| m == concrete))
            .collect()
    }

    pub fn type_tables(&self) -> impl Iterator<Item = &TypeTable> {
        self.types.values()
    }

    pub fn join_tables(&self) -> impl Iterator<Item = &JoinTable> {
        self.joins.values()
    }

    pub fn unique_tables(&self) -> impl Iterator<Item = &UniqueConstraintTable> {
        self.uniques.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mediator::DefaultMediatorFactory;
    use crate::schema::SchemaDefinition;
    use crate::types::{NamedAttributeHolder, UniqueConstraint};

    fn registry(schema: &Schema, config: &EngineConfig) -> Result<TableRegistry> {
        let mediators = MediatorRegistry::build(schema, &DefaultMediatorFactory::new())?;
        TableRegistry::build(schema, &mediators, config)
    }

    fn shop() -> Schema {
        SchemaDefinition::new("shop")
            .with_holder(
                NamedAttributeHolder::new_mixin("Tagged").with_attribute(Attribute::string("tag")),
            )
            .with_holder(
                NamedAttributeHolder::new_type("Party")
                    .as_abstract()
                    .with_attribute(Attribute::string("email").mandatory())
                    .with_unique_constraint(UniqueConstraint::new(["email"])),
            )
            .with_holder(
                NamedAttributeHolder::new_type("Customer")
                    .with_parent("Party")
                    .with_mixin("Tagged")
                    .with_attribute(Attribute::inverse("orders", "Order", "customer")),
            )
            .with_holder(
                NamedAttributeHolder::new_type("Order")
                    .with_attribute(Attribute::reference("customer", "Customer"))
                    .with_attribute(Attribute::decimal("totalAmount", Some(12), Some(2))),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_type_tables_include_inherited_columns() {
        let schema = shop();
        let config = EngineConfig::default();
        let tables = registry(&schema, &config).unwrap();

        let customer = tables.type_table("Customer").unwrap();
        assert_eq!(customer.name, "CUSTOMER");
        let names: Vec<&str> = customer.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["EMAIL", "TAG"]);
        assert!(customer.column("email").unwrap().mandatory);

        let order = tables.type_table("Order").unwrap();
        assert_eq!(order.column("totalAmount").unwrap().ddl_type, "NUMERIC(12,2)");
        assert!(tables.type_table("Party").is_err());
    }

    #[test]
    fn test_join_and_unique_tables() {
        let schema = shop();
        let config = EngineConfig::builder("").table_prefix("X_").build();
        let tables = registry(&schema, &config).unwrap();

        let joins: Vec<&str> = tables
            .join_tables_of("Customer")
            .iter()
            .map(|j| j.name.as_str())
            .collect();
        assert_eq!(joins, vec!["X_JOIN_PARTY", "X_JOIN_TAGGED"]);
        assert!(tables.join_tables_of("Order").is_empty());

        let uniques = tables.unique_tables_of("Customer");
        assert_eq!(uniques.len(), 1);
        assert_eq!(uniques[0].name, "X_UQ_PARTY_0");
        assert!(uniques[0].covers("email"));
    }

    #[test]
    fn test_unique_constraint_on_inverse_rejected() {
        let schema = SchemaDefinition::new("s")
            .with_holder(
                NamedAttributeHolder::new_type("Cart")
                    .with_attribute(Attribute::inverse("items", "Item", "cart"))
                    .with_unique_constraint(UniqueConstraint::new(["items"])),
            )
            .with_holder(
                NamedAttributeHolder::new_type("Item")
                    .with_attribute(Attribute::reference("cart", "Cart")),
            )
            .build()
            .unwrap();
        let err = registry(&schema, &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, EngineError::Schema(_)));
    }
}
