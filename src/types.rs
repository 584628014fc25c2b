//! Core schema type definitions
//!
//! Includes attribute kinds, attribute definitions, named attribute holders
//! (types and mixins) and unique constraints.

use serde::{Deserialize, Serialize};

// ============================================================================
// Attribute Kinds
// ============================================================================

/// Kind of an attribute, deciding which mediator translates it to SQL
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AttributeKind {
    /// Character data, optionally length-limited
    String {
        #[serde(default)]
        length: Option<u32>,
    },

    /// Numeric value; the storage kind follows from `length` and `decimal_places`
    Decimal {
        #[serde(default)]
        length: Option<u8>,
        #[serde(default, rename = "decimalPlaces")]
        decimal_places: Option<u8>,
    },

    Boolean,

    /// Point in time, stored in UTC
    Date,

    /// Binary content stored in a BLOB column
    Binary,

    /// Binary content encrypted through a crypto provider before storage
    Crypto {
        /// Values are strings, encrypted as their UTF-8 bytes
        #[serde(default, rename = "plainString")]
        plain_string: bool,
        /// When false, values are handed out as base64 ciphertext instead of plaintext
        #[serde(default = "default_auto_decrypted", rename = "autoDecrypted")]
        auto_decrypted: bool,
    },

    /// Record or free JSON document stored as JSON bytes
    Json {
        /// Holder the stored document is rehydrated as, if any
        #[serde(default)]
        holder: Option<String>,
    },

    /// To-one reference to a record of `holder` (or of one of its subtypes)
    NamedAttributeHolder {
        holder: String,
        /// Attribute on the referenced holder that points back at the owner
        #[serde(default, rename = "toOneAttribute")]
        to_one_attribute: Option<String>,
    },

    /// To-many relation computed from the `referenced_attribute` of `holder` records
    Inverse {
        holder: String,
        #[serde(rename = "referencedAttribute")]
        referenced_attribute: String,
    },
}

fn default_auto_decrypted() -> bool {
    true
}

/// Discriminant of [`AttributeKind`], used to key the mediator registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttributeKindTag {
    String,
    Decimal,
    Boolean,
    Date,
    Binary,
    Crypto,
    Json,
    NamedAttributeHolder,
    Inverse,
}

impl AttributeKindTag {
    pub const ALL: [AttributeKindTag; 9] = [
        AttributeKindTag::String,
        AttributeKindTag::Decimal,
        AttributeKindTag::Boolean,
        AttributeKindTag::Date,
        AttributeKindTag::Binary,
        AttributeKindTag::Crypto,
        AttributeKindTag::Json,
        AttributeKindTag::NamedAttributeHolder,
        AttributeKindTag::Inverse,
    ];
}

impl AttributeKind {
    pub fn tag(&self) -> AttributeKindTag {
        match self {
            AttributeKind::String { .. } => AttributeKindTag::String,
            AttributeKind::Decimal { .. } => AttributeKindTag::Decimal,
            AttributeKind::Boolean => AttributeKindTag::Boolean,
            AttributeKind::Date => AttributeKindTag::Date,
            AttributeKind::Binary => AttributeKindTag::Binary,
            AttributeKind::Crypto { .. } => AttributeKindTag::Crypto,
            AttributeKind::Json { .. } => AttributeKindTag::Json,
            AttributeKind::NamedAttributeHolder { .. } => AttributeKindTag::NamedAttributeHolder,
            AttributeKind::Inverse { .. } => AttributeKindTag::Inverse,
        }
    }

    /// Holder referenced by this kind, for to-one, inverse and typed JSON attributes
    pub fn referenced_holder(&self) -> Option<&str> {
        match self {
            AttributeKind::NamedAttributeHolder { holder, .. }
            | AttributeKind::Inverse { holder, .. } => Some(holder),
            AttributeKind::Json { holder } => holder.as_deref(),
            _ => None,
        }
    }
}

// ============================================================================
// Attributes
// ============================================================================

/// Attribute declared on a type or mixin
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attribute {
    /// Attribute name (lower camel case)
    pub name: String,

    #[serde(flatten)]
    pub kind: AttributeKind,

    /// Whether the column must not be NULL (default: false)
    #[serde(default)]
    pub mandatory: bool,
}

impl Attribute {
    pub fn new(name: impl Into<String>, kind: AttributeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            mandatory: false,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, AttributeKind::String { length: None })
    }

    /// Decimal attribute; see [`AttributeKind::Decimal`] for the storage rules
    pub fn decimal(name: impl Into<String>, length: Option<u8>, decimal_places: Option<u8>) -> Self {
        Self::new(
            name,
            AttributeKind::Decimal {
                length,
                decimal_places,
            },
        )
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, AttributeKind::Boolean)
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, AttributeKind::Date)
    }

    pub fn binary(name: impl Into<String>) -> Self {
        Self::new(name, AttributeKind::Binary)
    }

    pub fn crypto(name: impl Into<String>) -> Self {
        Self::new(
            name,
            AttributeKind::Crypto {
                plain_string: false,
                auto_decrypted: true,
            },
        )
    }

    pub fn json(name: impl Into<String>, holder: Option<&str>) -> Self {
        Self::new(
            name,
            AttributeKind::Json {
                holder: holder.map(str::to_string),
            },
        )
    }

    pub fn reference(name: impl Into<String>, holder: impl Into<String>) -> Self {
        Self::new(
            name,
            AttributeKind::NamedAttributeHolder {
                holder: holder.into(),
                to_one_attribute: None,
            },
        )
    }

    pub fn inverse(
        name: impl Into<String>,
        holder: impl Into<String>,
        referenced_attribute: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            AttributeKind::Inverse {
                holder: holder.into(),
                referenced_attribute: referenced_attribute.into(),
            },
        )
    }

    /// Set the attribute as mandatory
    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    /// Limit the length of a string attribute
    pub fn length(mut self, max: u32) -> Self {
        if let AttributeKind::String { length } = &mut self.kind {
            *length = Some(max);
        }
        self
    }

    /// Declare the back-reference attribute of a to-one reference
    pub fn to_one(mut self, attribute: impl Into<String>) -> Self {
        if let AttributeKind::NamedAttributeHolder {
            to_one_attribute, ..
        } = &mut self.kind
        {
            *to_one_attribute = Some(attribute.into());
        }
        self
    }

    /// Encrypt string values as UTF-8 bytes
    pub fn plain_string(mut self) -> Self {
        if let AttributeKind::Crypto { plain_string, .. } = &mut self.kind {
            *plain_string = true;
        }
        self
    }

    /// Hand out ciphertext (base64) instead of decrypting on read
    pub fn not_auto_decrypted(mut self) -> Self {
        if let AttributeKind::Crypto { auto_decrypted, .. } = &mut self.kind {
            *auto_decrypted = false;
        }
        self
    }

    pub fn tag(&self) -> AttributeKindTag {
        self.kind.tag()
    }
}

// ============================================================================
// Named Attribute Holders
// ============================================================================

/// Whether a holder is a (possibly abstract) type or a mixin
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "holder", rename_all = "lowercase")]
pub enum HolderKind {
    Type {
        #[serde(default)]
        parent: Option<String>,
        #[serde(default, rename = "abstract")]
        is_abstract: bool,
        #[serde(default)]
        mixins: Vec<String>,
    },
    Mixin,
}

/// Set of attributes whose combined values must be unique
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UniqueConstraint {
    pub attributes: Vec<String>,
}

impl UniqueConstraint {
    pub fn new<I, S>(attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            attributes: attributes.into_iter().map(Into::into).collect(),
        }
    }
}

/// A type or mixin owning a set of attributes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NamedAttributeHolder {
    /// Holder name (upper camel case)
    pub name: String,

    #[serde(flatten)]
    pub kind: HolderKind,

    /// Attributes declared directly on this holder
    #[serde(default)]
    pub attributes: Vec<Attribute>,

    #[serde(default, rename = "uniqueConstraints")]
    pub unique_constraints: Vec<UniqueConstraint>,
}

impl NamedAttributeHolder {
    /// Create a concrete type without parent
    pub fn new_type(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: HolderKind::Type {
                parent: None,
                is_abstract: false,
                mixins: Vec::new(),
            },
            attributes: Vec::new(),
            unique_constraints: Vec::new(),
        }
    }

    pub fn new_mixin(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: HolderKind::Mixin,
            attributes: Vec::new(),
            unique_constraints: Vec::new(),
        }
    }

    /// Set the supertype (ignored for mixins)
    pub fn with_parent(mut self, name: impl Into<String>) -> Self {
        if let HolderKind::Type { parent, .. } = &mut self.kind {
            *parent = Some(name.into());
        }
        self
    }

    /// Mark the type as abstract (ignored for mixins)
    pub fn as_abstract(mut self) -> Self {
        if let HolderKind::Type { is_abstract, .. } = &mut self.kind {
            *is_abstract = true;
        }
        self
    }

    /// Mix a mixin into the type (ignored for mixins)
    pub fn with_mixin(mut self, name: impl Into<String>) -> Self {
        if let HolderKind::Type { mixins, .. } = &mut self.kind {
            mixins.push(name.into());
        }
        self
    }

    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn with_unique_constraint(mut self, constraint: UniqueConstraint) -> Self {
        self.unique_constraints.push(constraint);
        self
    }

    pub fn is_mixin(&self) -> bool {
        matches!(self.kind, HolderKind::Mixin)
    }

    /// Whether records of exactly this holder can exist
    pub fn is_concrete(&self) -> bool {
        matches!(
            self.kind,
            HolderKind::Type {
                is_abstract: false,
                ..
            }
        )
    }

    pub fn parent(&self) -> Option<&str> {
        match &self.kind {
            HolderKind::Type { parent, .. } => parent.as_deref(),
            HolderKind::Mixin => None,
        }
    }

    pub fn mixins(&self) -> &[String] {
        match &self.kind {
            HolderKind::Type { mixins, .. } => mixins,
            HolderKind::Mixin => &[],
        }
    }

    pub fn own_attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }
}
