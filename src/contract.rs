//! Contracts describe how typed graph nodes map to and from JSON
//!
//! A [`Contract`] is the built, immutable description the mapper follows for one
//! registered type: an object with named members, a dictionary, an array, a
//! primitive, a dynamic bag or a custom conversion. Contracts are built once by a
//! [`ContractResolver`] from registered [`TypeDescriptor`]s — never from runtime
//! introspection — and cached for the lifetime of the resolver instance.

use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, RwLock};

use thiserror::Error;

use crate::convert::Converter;
use crate::graph::Node;
use crate::ser::{DefaultValueHandling, NullValueHandling};

/// Type expectation of a member or array element slot
#[derive(PartialEq, Clone, Debug, Default)]
pub enum DeclaredType {
    /// Any value; mapped dynamically
    #[default]
    Any,
    /// An instance of the named registered type
    Named(String),
}

impl DeclaredType {
    /// Creates a [`DeclaredType::Named`]
    pub fn named(tag: impl Into<String>) -> Self {
        DeclaredType::Named(tag.into())
    }
}

/// Kind of a primitive contract
#[derive(PartialEq, Eq, Clone, Copy, strum::Display, Debug)]
pub enum PrimitiveKind {
    /// Boolean value
    Bool,
    /// `i64` integer value
    Int,
    /// Arbitrary precision integer value
    BigInt,
    /// `f64` floating point value
    Float,
    /// Fixed-point decimal value
    Decimal,
    /// String value
    String,
    /// Date value, read from ISO-8601 or legacy date strings
    Date,
    /// Byte array value, read from base64 strings
    Bytes,
}

/// Whether members participate by default or must be opted in
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
pub enum MemberSelection {
    /// All registered members participate unless marked [`ignored`](MemberSpec::ignore)
    #[default]
    OptOut,
    /// Only members marked [`included`](MemberSpec::include) participate
    OptIn,
}

/// Registration-time description of one object member
#[derive(Clone)]
pub struct MemberSpec {
    /// JSON member name
    pub name: String,
    /// Whether the member participates under [`MemberSelection::OptIn`]
    pub included: bool,
    /// Whether the member is excluded under [`MemberSelection::OptOut`]
    pub ignored: bool,
    /// Whether the member must be present when deserializing
    pub required: bool,
    /// Default value; populated when the member is absent on deserialize and
    /// compared against for [`DefaultValueHandling::Ignore`] on serialize
    pub default: Option<Node>,
    /// Type expectation for the member value
    pub declared_type: DeclaredType,
    /// Converter overriding default behavior for this member
    pub converter: Option<Arc<dyn Converter>>,
    /// Write order; members without an explicit order come first, in declaration order
    pub order: Option<i32>,
    /// Per-member override of the mapper's null value handling
    pub null_handling: Option<NullValueHandling>,
    /// Per-member override of the mapper's default value handling
    pub default_handling: Option<DefaultValueHandling>,
}

impl MemberSpec {
    /// Creates a member spec with default settings
    pub fn new(name: impl Into<String>) -> Self {
        MemberSpec {
            name: name.into(),
            included: false,
            ignored: false,
            required: false,
            default: None,
            declared_type: DeclaredType::Any,
            converter: None,
            order: None,
            null_handling: None,
            default_handling: None,
        }
    }

    /// Marks the member as required on deserialize
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Marks the member as included under [`MemberSelection::OptIn`]
    pub fn include(mut self) -> Self {
        self.included = true;
        self
    }

    /// Marks the member as ignored under [`MemberSelection::OptOut`]
    pub fn ignore(mut self) -> Self {
        self.ignored = true;
        self
    }

    /// Sets the default value
    pub fn with_default(mut self, default: impl Into<Node>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Sets the type expectation
    pub fn typed(mut self, tag: impl Into<String>) -> Self {
        self.declared_type = DeclaredType::Named(tag.into());
        self
    }

    /// Sets the converter overriding default behavior for this member
    pub fn with_converter(mut self, converter: Arc<dyn Converter>) -> Self {
        self.converter = Some(converter);
        self
    }

    /// Sets the explicit write order
    pub fn ordered(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    /// Overrides the mapper's null value handling for this member
    pub fn with_null_handling(mut self, handling: NullValueHandling) -> Self {
        self.null_handling = Some(handling);
        self
    }

    /// Overrides the mapper's default value handling for this member
    pub fn with_default_handling(mut self, handling: DefaultValueHandling) -> Self {
        self.default_handling = Some(handling);
        self
    }
}

impl Debug for MemberSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemberSpec")
            .field("name", &self.name)
            .field("required", &self.required)
            .field("declared_type", &self.declared_type)
            .field("has_converter", &self.converter.is_some())
            .field("order", &self.order)
            .finish()
    }
}

/// Registration-time description of a type
pub struct TypeDescriptor {
    /// The tag identifying the type
    pub tag: String,
    /// Shape of the type
    pub kind: DescriptorKind,
}

/// Shape of a registered type
pub enum DescriptorKind {
    /// Object with named members
    Object {
        /// Member selection mode
        selection: MemberSelection,
        /// Member specs in declaration order
        members: Vec<MemberSpec>,
        /// Name of a member collecting unmapped input members, if any
        extension_member: Option<String>,
        /// Per-type override of the mapper's reference preservation
        preserve_references: Option<bool>,
    },
    /// Dictionary with arbitrary string keys
    Dictionary {
        /// Type expectation for the values
        value_type: DeclaredType,
    },
    /// Array
    Array {
        /// Type expectation for the items
        element_type: DeclaredType,
    },
    /// Primitive value
    Primitive(PrimitiveKind),
    /// Dynamic bag; values are mapped as-is
    Dynamic,
    /// Reading and writing is delegated entirely to the converter
    Custom(Arc<dyn Converter>),
}

impl TypeDescriptor {
    /// Creates an object descriptor with [`MemberSelection::OptOut`]
    pub fn object(tag: impl Into<String>, members: Vec<MemberSpec>) -> Self {
        TypeDescriptor {
            tag: tag.into(),
            kind: DescriptorKind::Object {
                selection: MemberSelection::OptOut,
                members,
                extension_member: None,
                preserve_references: None,
            },
        }
    }

    /// Creates a dictionary descriptor
    pub fn dictionary(tag: impl Into<String>, value_type: DeclaredType) -> Self {
        TypeDescriptor {
            tag: tag.into(),
            kind: DescriptorKind::Dictionary { value_type },
        }
    }

    /// Creates an array descriptor
    pub fn array(tag: impl Into<String>, element_type: DeclaredType) -> Self {
        TypeDescriptor {
            tag: tag.into(),
            kind: DescriptorKind::Array { element_type },
        }
    }

    /// Creates a primitive descriptor
    pub fn primitive(tag: impl Into<String>, kind: PrimitiveKind) -> Self {
        TypeDescriptor {
            tag: tag.into(),
            kind: DescriptorKind::Primitive(kind),
        }
    }

    /// Creates a custom descriptor delegating to a converter
    pub fn custom(tag: impl Into<String>, converter: Arc<dyn Converter>) -> Self {
        TypeDescriptor {
            tag: tag.into(),
            kind: DescriptorKind::Custom(converter),
        }
    }
}

/// Built contract of one object member
#[derive(Clone)]
pub struct MemberContract {
    /// JSON member name
    pub name: String,
    /// Whether the member must be present when deserializing
    pub required: bool,
    /// Default value of the member
    pub default: Option<Node>,
    /// Type expectation for the member value
    pub declared_type: DeclaredType,
    /// Converter overriding default behavior for this member
    pub converter: Option<Arc<dyn Converter>>,
    /// Per-member override of the mapper's null value handling
    pub null_handling: Option<NullValueHandling>,
    /// Per-member override of the mapper's default value handling
    pub default_handling: Option<DefaultValueHandling>,
}

impl Debug for MemberContract {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemberContract")
            .field("name", &self.name)
            .field("required", &self.required)
            .field("declared_type", &self.declared_type)
            .field("has_converter", &self.converter.is_some())
            .finish()
    }
}

/// Built contract of an object type
#[derive(Clone, Debug)]
pub struct ObjectContract {
    /// The tag identifying the type
    pub type_tag: String,
    /// Participating members in write order
    pub members: Vec<MemberContract>,
    /// Name of the member collecting unmapped input members, if any
    pub extension_member: Option<String>,
    /// Per-type override of the mapper's reference preservation
    pub preserve_references: Option<bool>,
}

impl ObjectContract {
    /// Finds a member contract by name
    pub fn member(&self, name: &str) -> Option<&MemberContract> {
        self.members.iter().find(|m| m.name == name)
    }
}

/// The built, immutable description of how a type is mapped
///
/// Once returned by a resolver a contract never changes and is safely shared
/// across concurrent operations.
#[derive(Clone)]
pub enum Contract {
    /// Object with named members
    Object(ObjectContract),
    /// Dictionary with arbitrary string keys
    Dictionary {
        /// Type expectation for the values
        value_type: DeclaredType,
    },
    /// Array
    Array {
        /// Type expectation for the items
        element_type: DeclaredType,
    },
    /// Primitive value
    Primitive(PrimitiveKind),
    /// Dynamic bag
    Dynamic,
    /// Reading and writing is delegated entirely to the converter
    Custom(Arc<dyn Converter>),
}

impl Debug for Contract {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Contract::Object(contract) => f.debug_tuple("Object").field(contract).finish(),
            Contract::Dictionary { value_type } => {
                f.debug_struct("Dictionary").field("value_type", value_type).finish()
            }
            Contract::Array { element_type } => f
                .debug_struct("Array")
                .field("element_type", element_type)
                .finish(),
            Contract::Primitive(kind) => f.debug_tuple("Primitive").field(kind).finish(),
            Contract::Dynamic => f.write_str("Dynamic"),
            Contract::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Error which occurred while resolving a contract
#[derive(Error, Debug)]
pub enum ContractError {
    /// No type with the tag is registered
    #[error("No contract is registered for type '{0}'.")]
    UnknownType(String),
    /// The registered descriptor is inconsistent
    #[error("Invalid contract for type '{type_tag}': {message}")]
    InvalidDescriptor {
        /// The tag of the offending type
        type_tag: String,
        /// Why the descriptor is invalid
        message: String,
    },
}

/// Registry of type descriptors contracts are built from
#[derive(Default)]
pub struct TypeRegistry {
    types: HashMap<String, TypeDescriptor>,
}

impl TypeRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        TypeRegistry::default()
    }

    /// Registers a type descriptor, replacing any previous descriptor with the same tag
    pub fn register(&mut self, descriptor: TypeDescriptor) -> &mut Self {
        self.types.insert(descriptor.tag.clone(), descriptor);
        self
    }

    fn get(&self, tag: &str) -> Option<&TypeDescriptor> {
        self.types.get(tag)
    }
}

/// Resolves types to their contracts
///
/// A resolver is swappable wholesale, for example to change naming conventions.
/// Contract caches belong to the resolver instance and never leak across distinct
/// resolver instances.
pub trait ContractResolver: Send + Sync {
    /// Resolves the contract for a type
    ///
    /// Contract construction is pure with respect to the type; callers must treat
    /// the returned contract as immutable. Implementations memoize per type tag and
    /// must support concurrent lookups, with at most one winner on a cache-miss race.
    fn resolve(&self, type_tag: &str) -> Result<Arc<Contract>, ContractError>;
}

/// The default [`ContractResolver`] building contracts from a [`TypeRegistry`]
pub struct DefaultContractResolver {
    registry: TypeRegistry,
    cache: RwLock<HashMap<String, Arc<Contract>>>,
}

impl DefaultContractResolver {
    /// Creates a resolver over the given registry
    pub fn new(registry: TypeRegistry) -> Self {
        DefaultContractResolver {
            registry,
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn build_contract(&self, descriptor: &TypeDescriptor) -> Result<Contract, ContractError> {
        Ok(match &descriptor.kind {
            DescriptorKind::Object {
                selection,
                members,
                extension_member,
                preserve_references,
            } => {
                let mut built: Vec<MemberContract> = members
                    .iter()
                    .filter(|m| match selection {
                        MemberSelection::OptOut => !m.ignored,
                        MemberSelection::OptIn => m.included,
                    })
                    .map(|m| MemberContract {
                        name: m.name.clone(),
                        required: m.required,
                        default: m.default.clone(),
                        declared_type: m.declared_type.clone(),
                        converter: m.converter.clone(),
                        null_handling: m.null_handling,
                        default_handling: m.default_handling,
                    })
                    .collect();
                // Members without an explicit order come first, in declaration order
                let orders: HashMap<&str, i32> = members
                    .iter()
                    .filter_map(|m| m.order.map(|o| (m.name.as_str(), o)))
                    .collect();
                built.sort_by_key(|m| orders.get(m.name.as_str()).copied().unwrap_or(i32::MIN));

                let mut seen = HashMap::new();
                for member in &built {
                    if seen.insert(member.name.clone(), ()).is_some() {
                        return Err(ContractError::InvalidDescriptor {
                            type_tag: descriptor.tag.clone(),
                            message: format!("duplicate member '{}'", member.name),
                        });
                    }
                }
                if let Some(extension) = extension_member {
                    if seen.contains_key(extension) {
                        return Err(ContractError::InvalidDescriptor {
                            type_tag: descriptor.tag.clone(),
                            message: format!(
                                "extension member '{extension}' clashes with a regular member"
                            ),
                        });
                    }
                }

                Contract::Object(ObjectContract {
                    type_tag: descriptor.tag.clone(),
                    members: built,
                    extension_member: extension_member.clone(),
                    preserve_references: *preserve_references,
                })
            }
            DescriptorKind::Dictionary { value_type } => Contract::Dictionary {
                value_type: value_type.clone(),
            },
            DescriptorKind::Array { element_type } => Contract::Array {
                element_type: element_type.clone(),
            },
            DescriptorKind::Primitive(kind) => Contract::Primitive(*kind),
            DescriptorKind::Dynamic => Contract::Dynamic,
            DescriptorKind::Custom(converter) => Contract::Custom(converter.clone()),
        })
    }
}

impl ContractResolver for DefaultContractResolver {
    fn resolve(&self, type_tag: &str) -> Result<Arc<Contract>, ContractError> {
        if let Some(contract) = self
            .cache
            .read()
            .expect("contract cache lock poisoned")
            .get(type_tag)
        {
            return Ok(contract.clone());
        }

        let descriptor = self
            .registry
            .get(type_tag)
            .ok_or_else(|| ContractError::UnknownType(type_tag.to_owned()))?;
        let contract = Arc::new(self.build_contract(descriptor)?);

        // On a cache-miss race the first writer wins and all callers see its contract
        let mut cache = self.cache.write().expect("contract cache lock poisoned");
        Ok(cache
            .entry(type_tag.to_owned())
            .or_insert(contract)
            .clone())
    }
}
