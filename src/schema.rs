//! Schema definition and resolution
//!
//! A [`SchemaDefinition`] is the serializable description of types and mixins.
//! Building it validates the definition and produces an immutable [`Schema`]
//! that answers inheritance questions (ancestors, concrete subtypes, join
//! table participation) for the rest of the engine.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::sql::sanitize::{validate_attribute_name, validate_holder_name};
use crate::types::{Attribute, AttributeKind, NamedAttributeHolder, UniqueConstraint};

/// Serializable schema description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDefinition {
    /// Schema name
    pub name: String,
    /// Types and mixins
    #[serde(default)]
    pub holders: Vec<NamedAttributeHolder>,
}

impl SchemaDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            holders: Vec::new(),
        }
    }

    pub fn with_holder(mut self, holder: NamedAttributeHolder) -> Self {
        self.holders.push(holder);
        self
    }

    /// Parse a definition from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Validate the definition and build the resolved schema
    pub fn build(self) -> Result<Schema> {
        Schema::new(self)
    }
}

/// Validated, immutable schema
#[derive(Debug, Clone)]
pub struct Schema {
    name: String,
    holders: BTreeMap<String, NamedAttributeHolder>,
    /// Direct subtypes per type
    children: BTreeMap<String, Vec<String>>,
    /// Types mixing in a mixin directly
    mixed_into: BTreeMap<String, Vec<String>>,
}

impl Schema {
    fn new(definition: SchemaDefinition) -> Result<Self> {
        let mut holders = BTreeMap::new();
        for holder in definition.holders {
            validate_holder_name(&holder.name).map_err(EngineError::schema)?;
            for attribute in &holder.attributes {
                validate_attribute_name(&attribute.name).map_err(|e| {
                    EngineError::schema(format!("{} on holder '{}'", e, holder.name))
                })?;
            }
            if holders.contains_key(&holder.name) {
                return Err(EngineError::schema(format!(
                    "Holder '{}' is declared twice",
                    holder.name
                )));
            }
            holders.insert(holder.name.clone(), holder);
        }

        let mut children: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut mixed_into: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for holder in holders.values() {
            if let Some(parent) = holder.parent() {
                match holders.get(parent) {
                    Some(p) if !p.is_mixin() => {}
                    Some(_) => {
                        return Err(EngineError::schema(format!(
                            "Type '{}' cannot extend mixin '{}'",
                            holder.name, parent
                        )));
                    }
                    None => {
                        return Err(EngineError::schema(format!(
                            "Type '{}' extends unknown type '{}'",
                            holder.name, parent
                        )));
                    }
                }
                children
                    .entry(parent.to_string())
                    .or_default()
                    .push(holder.name.clone());
            }
            for mixin in holder.mixins() {
                match holders.get(mixin) {
                    Some(m) if m.is_mixin() => {}
                    _ => {
                        return Err(EngineError::schema(format!(
                            "Type '{}' mixes in '{}' which is not a mixin",
                            holder.name, mixin
                        )));
                    }
                }
                mixed_into
                    .entry(mixin.clone())
                    .or_default()
                    .push(holder.name.clone());
            }
        }

        let schema = Self {
            name: definition.name,
            holders,
            children,
            mixed_into,
        };
        schema.validate()?;
        Ok(schema)
    }

    fn validate(&self) -> Result<()> {
        for holder in self.holders.values() {
            // Inheritance cycles
            let mut seen = HashSet::new();
            let mut current = Some(holder.name.as_str());
            while let Some(name) = current {
                if !seen.insert(name) {
                    return Err(EngineError::schema(format!(
                        "Inheritance cycle detected at type '{}'",
                        holder.name
                    )));
                }
                current = self.holders.get(name).and_then(|h| h.parent());
            }
        }

        for holder in self.holders.values() {
            let attributes = self.all_attributes(&holder.name);
            let mut names = HashSet::new();
            for attribute in &attributes {
                if !names.insert(attribute.name.as_str()) {
                    return Err(EngineError::schema(format!(
                        "Attribute '{}' is declared more than once for '{}'",
                        attribute.name, holder.name
                    )));
                }
                self.validate_attribute(&holder.name, attribute)?;
            }
            for constraint in &holder.unique_constraints {
                if constraint.attributes.is_empty() {
                    return Err(EngineError::schema(format!(
                        "Unique constraint on '{}' has no attributes",
                        holder.name
                    )));
                }
                for name in &constraint.attributes {
                    if !names.contains(name.as_str()) {
                        return Err(EngineError::schema(format!(
                            "Unique constraint on '{}' references unknown attribute '{}'",
                            holder.name, name
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn validate_attribute(&self, owner: &str, attribute: &Attribute) -> Result<()> {
        if let Some(target) = attribute.kind.referenced_holder() {
            self.require_holder(target).map_err(|_| {
                EngineError::schema(format!(
                    "Attribute '{}.{}' references unknown holder '{}'",
                    owner, attribute.name, target
                ))
            })?;
        }
        match &attribute.kind {
            AttributeKind::NamedAttributeHolder {
                holder,
                to_one_attribute: Some(back),
            } => {
                self.require_reference_attribute(holder, back, owner, &attribute.name)?;
            }
            AttributeKind::Inverse {
                holder,
                referenced_attribute,
            } => {
                self.require_reference_attribute(
                    holder,
                    referenced_attribute,
                    owner,
                    &attribute.name,
                )?;
            }
            _ => {}
        }
        Ok(())
    }

    fn require_reference_attribute(
        &self,
        holder: &str,
        name: &str,
        owner: &str,
        declared_by: &str,
    ) -> Result<()> {
        match self.attribute(holder, name) {
            Some(Attribute {
                kind: AttributeKind::NamedAttributeHolder { .. },
                ..
            }) => Ok(()),
            _ => Err(EngineError::schema(format!(
                "Attribute '{}.{}' expects '{}.{}' to be a to-one reference",
                owner, declared_by, holder, name
            ))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn holders(&self) -> impl Iterator<Item = &NamedAttributeHolder> {
        self.holders.values()
    }

    pub fn holder(&self, name: &str) -> Option<&NamedAttributeHolder> {
        self.holders.get(name)
    }

    pub fn require_holder(&self, name: &str) -> Result<&NamedAttributeHolder> {
        self.holders
            .get(name)
            .ok_or_else(|| EngineError::schema(format!("Unknown attribute holder '{}'", name)))
    }

    /// Parent chain of a type, nearest first
    pub fn ancestors(&self, name: &str) -> Vec<&NamedAttributeHolder> {
        let mut result = Vec::new();
        let mut current = self.holders.get(name).and_then(|h| h.parent());
        while let Some(parent) = current {
            match self.holders.get(parent) {
                Some(holder) => {
                    result.push(holder);
                    current = holder.parent();
                }
                None => break,
            }
        }
        result
    }

    /// Every attribute of a holder: inherited ones first (root type first),
    /// each type's own attributes followed by the attributes of its mixins
    pub fn all_attributes(&self, name: &str) -> Vec<&Attribute> {
        let Some(holder) = self.holders.get(name) else {
            return Vec::new();
        };
        let mut chain = self.ancestors(name);
        chain.reverse();
        chain.push(holder);

        let mut result = Vec::new();
        for holder in chain {
            result.extend(holder.attributes.iter());
            for mixin in holder.mixins() {
                if let Some(m) = self.holders.get(mixin) {
                    result.extend(m.attributes.iter());
                }
            }
        }
        result
    }

    pub fn attribute(&self, holder: &str, name: &str) -> Option<&Attribute> {
        self.all_attributes(holder)
            .into_iter()
            .find(|a| a.name == name)
    }

    pub fn require_attribute(&self, holder: &str, name: &str) -> Result<&Attribute> {
        self.attribute(holder, name).ok_or_else(|| {
            EngineError::schema(format!("Unknown attribute '{}' on '{}'", name, holder))
        })
    }

    pub fn has_subtypes(&self, name: &str) -> bool {
        self.children.get(name).is_some_and(|c| !c.is_empty())
    }

    /// Whether references declared against `name` live in a join table id space
    pub fn requires_join_table(&self, name: &str) -> bool {
        self.holders.get(name).is_some_and(|h| h.is_mixin()) || self.has_subtypes(name)
    }

    /// Concrete types whose records are also records of `name`, sorted by name
    pub fn concrete_types_of(&self, name: &str) -> Vec<String> {
        let mut result = BTreeSet::new();
        let mut pending: Vec<String> = match self.holders.get(name) {
            Some(h) if h.is_mixin() => self.mixed_into.get(name).cloned().unwrap_or_default(),
            Some(_) => vec![name.to_string()],
            None => Vec::new(),
        };
        while let Some(current) = pending.pop() {
            if let Some(holder) = self.holders.get(&current) {
                if holder.is_concrete() {
                    result.insert(current.clone());
                }
            }
            if let Some(children) = self.children.get(&current) {
                pending.extend(children.iter().cloned());
            }
        }
        result.into_iter().collect()
    }

    /// Whether a record of type `concrete` can be stored where `declared` is expected
    pub fn is_assignable(&self, concrete: &str, declared: &str) -> bool {
        if concrete == declared {
            return true;
        }
        let Some(holder) = self.holders.get(concrete) else {
            return false;
        };
        std::iter::once(holder)
            .chain(self.ancestors(concrete))
            .any(|h| h.parent() == Some(declared) || h.mixins().iter().any(|m| m == declared))
    }

    /// Holders with a join table that records of `concrete` are registered in
    pub fn join_holders_of(&self, concrete: &str) -> Vec<String> {
        let Some(holder) = self.holders.get(concrete) else {
            return Vec::new();
        };
        let mut result: Vec<String> = Vec::new();
        let mut push = |name: &str| {
            if self.requires_join_table(name) && !result.iter().any(|r| r == name) {
                result.push(name.to_string());
            }
        };
        push(concrete);
        for ancestor in self.ancestors(concrete) {
            push(&ancestor.name);
        }
        for h in std::iter::once(holder).chain(self.ancestors(concrete)) {
            for mixin in h.mixins() {
                push(mixin);
            }
        }
        result
    }

    /// Unique constraints applying to records of `concrete`, with their declaring holder
    pub fn unique_constraints_for(
        &self,
        concrete: &str,
    ) -> Vec<(&NamedAttributeHolder, usize, &UniqueConstraint)> {
        self.holders
            .values()
            .filter(|h| self.is_assignable(concrete, &h.name))
            .flat_map(|h| {
                h.unique_constraints
                    .iter()
                    .enumerate()
                    .map(move |(index, constraint)| (h, index, constraint))
            })
            .collect()
    }
}
