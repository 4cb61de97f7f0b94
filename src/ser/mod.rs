//! The mapper engine: converting between [`Graph`]s and JSON token streams
//!
//! [`JsonMapper`] orchestrates the other components: it walks the graph (serialize)
//! or drives a reader while constructing nodes (deserialize), resolving a
//! [contract](crate::contract::Contract) per typed value, consulting the
//! [converter chain](crate::convert::Converter), tracking `$id`/`$ref` references
//! at container boundaries and enforcing the configured maximum depth.
//!
//! # Usage examples
//!
//! ```
//! # use std::sync::Arc;
//! # use mapson::contract::*;
//! # use mapson::graph::*;
//! # use mapson::ser::*;
//! let mut registry = TypeRegistry::new();
//! registry.register(TypeDescriptor::object(
//!     "point",
//!     vec![MemberSpec::new("x"), MemberSpec::new("y")],
//! ));
//! let mapper = JsonMapper::new(Arc::new(DefaultContractResolver::new(registry)));
//!
//! let mut graph = Graph::new();
//! let point = graph.insert(Node::typed_object("point"));
//! let x = graph.insert(1);
//! let y = graph.insert(2);
//! graph.set_member(point, "x", x);
//! graph.set_member(point, "y", y);
//!
//! let json = mapper.to_string(&graph, point)?;
//! assert_eq!(r#"{"x":1,"y":2}"#, json);
//!
//! let mut parsed_graph = Graph::new();
//! let parsed = mapper.parse_typed(&mut parsed_graph, &json, "point")?;
//! assert_eq!(true, graph.deep_eq(point, &parsed_graph, parsed));
//! # Ok::<(), mapson::ser::SerError>(())
//! ```

use std::fmt::{Debug, Formatter};
use std::io::Write;
use std::sync::Arc;

use crate::binder::{DefaultBinder, TypeBinder};
use crate::contract::{ContractResolver, DeclaredType};
use crate::convert::Converter;
use crate::graph::{Graph, NodeId};
use crate::reader::{
    ByteSource, CommentHandling, DateParseHandling, FloatParseHandling, JsonTextReader,
    ReaderSettings, SliceSource, TokenRead,
};
use crate::utf8;
use crate::writer::{
    DateFormatHandling, JsonTextWriter, NonFiniteHandling, TokenWrite, WriterSettings,
};

mod error;
pub use error::*;
mod references;
mod serialize;
pub use serialize::SerializeContext;
mod deserialize;
pub use deserialize::DeserializeContext;

// Re-export the resolver types most users need together with the mapper
pub use crate::contract::{
    DefaultContractResolver, MemberSpec, TypeDescriptor, TypeRegistry,
};
pub use crate::graph::Node;

/// When `$type` markers are written
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
pub enum TypeNameHandling {
    /// Never
    #[default]
    Off,
    /// Only for ambiguous slots, where the declared type does not pin down the
    /// actual type
    Auto,
    /// For every typed object
    All,
}

/// Which container kinds participate in `$id`/`$ref` reference preservation
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
pub enum PreserveReferences {
    /// No reference preservation
    #[default]
    Off,
    /// Objects only
    Objects,
    /// Arrays only, wrapped as `{"$id":"n","$values":[...]}`
    Arrays,
    /// Objects and arrays
    All,
}

impl PreserveReferences {
    /// Whether objects participate
    pub fn objects(self) -> bool {
        matches!(self, PreserveReferences::Objects | PreserveReferences::All)
    }

    /// Whether arrays participate
    pub fn arrays(self) -> bool {
        matches!(self, PreserveReferences::Arrays | PreserveReferences::All)
    }
}

/// What happens when the serializer encounters a cycle without reference preservation
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
pub enum ReferenceLoopHandling {
    /// Fail with [`SerError::ReferenceLoop`]
    #[default]
    Error,
    /// Omit the offending member or array item
    Ignore,
    /// Serialize anyway; the nesting will run into the depth limit
    Serialize,
}

/// Whether deserialization reuses existing target nodes or replaces them
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
pub enum ObjectCreationHandling {
    /// Construct fresh nodes
    #[default]
    Replace,
    /// Merge into existing object members and append to existing arrays
    Reuse,
}

/// Whether members with null values are written
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
pub enum NullValueHandling {
    /// Write null members
    #[default]
    Include,
    /// Omit null members
    Ignore,
}

/// Whether members equal to their registered default are written
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
pub enum DefaultValueHandling {
    /// Write default-valued members
    #[default]
    Include,
    /// Omit default-valued members
    Ignore,
}

/// What happens with input members the target type has no counterpart for
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
pub enum MissingMemberHandling {
    /// Drop them
    #[default]
    Ignore,
    /// Fail with [`SerError::MissingMember`]
    Error,
}

/// Per-element error hook; setting [`ErrorContext::handled`] suppresses propagation
pub type ErrorCallback = Arc<dyn Fn(&mut ErrorContext) + Send + Sync>;

/// Observational trace hook receiving structured start/finish/error events
pub type TraceHook = Arc<dyn Fn(&TraceEvent) + Send + Sync>;

/// Settings to customize the mapper behavior
///
/// To avoid repeating the default values for unchanged settings
/// `..MapperSettings::new()` can be used.
#[derive(Clone)]
pub struct MapperSettings {
    /// Indentation unit for the writers created by [`JsonMapper::to_string`];
    /// `None` writes compact output
    pub indentation: Option<String>,

    /// Maximum nesting depth, enforced on both directions
    ///
    /// The readers created by [`JsonMapper::parse_str`] use the same bound, so a
    /// maliciously deep payload cannot exhaust the call stack even though the
    /// mapper recurses independently of the raw tokenizer.
    pub max_depth: usize,

    /// When `$type` markers are written
    pub type_name_handling: TypeNameHandling,

    /// Which container kinds participate in `$id`/`$ref` reference preservation
    pub preserve_references: PreserveReferences,

    /// What happens when the serializer encounters a cycle
    pub reference_loop_handling: ReferenceLoopHandling,

    /// Whether deserialization reuses existing target nodes
    pub object_creation_handling: ObjectCreationHandling,

    /// Whether members with null values are written
    pub null_value_handling: NullValueHandling,

    /// Whether members equal to their registered default are written
    pub default_value_handling: DefaultValueHandling,

    /// What happens with unmapped input members
    pub missing_member_handling: MissingMemberHandling,

    /// Which date textual forms are recognized by [`JsonMapper::parse_str`]
    pub date_parse_handling: DateParseHandling,

    /// Which textual form date values are written in
    pub date_format_handling: DateFormatHandling,

    /// How non-integer number literals are parsed by [`JsonMapper::parse_str`]
    pub float_parse_handling: FloatParseHandling,

    /// How non-finite `f64` values are written
    pub non_finite_handling: NonFiniteHandling,

    /// Ordered converter chain, consulted before contract-default behavior
    pub converters: Vec<Arc<dyn Converter>>,

    /// Per-element error hook
    pub error_callback: Option<ErrorCallback>,

    /// Observational trace hook
    pub trace_hook: Option<TraceHook>,
}

impl MapperSettings {
    /// Creates the default mapper settings
    ///
    /// - compact output, max depth 64
    /// - type names: off; reference preservation: off; loops: error
    /// - object creation: replace; null and default members: included
    /// - missing members: ignored
    /// - dates: recognized on read, ISO-8601 on write
    /// - floats: `f64` with decimal fallback; non-finite: error
    pub fn new() -> Self {
        MapperSettings {
            indentation: None,
            max_depth: 64,
            type_name_handling: TypeNameHandling::default(),
            preserve_references: PreserveReferences::default(),
            reference_loop_handling: ReferenceLoopHandling::default(),
            object_creation_handling: ObjectCreationHandling::default(),
            null_value_handling: NullValueHandling::default(),
            default_value_handling: DefaultValueHandling::default(),
            missing_member_handling: MissingMemberHandling::default(),
            date_parse_handling: DateParseHandling::DateTime,
            date_format_handling: DateFormatHandling::default(),
            float_parse_handling: FloatParseHandling::default(),
            non_finite_handling: NonFiniteHandling::default(),
            converters: Vec::new(),
            error_callback: None,
            trace_hook: None,
        }
    }
}

impl Default for MapperSettings {
    fn default() -> Self {
        MapperSettings::new()
    }
}

impl Debug for MapperSettings {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapperSettings")
            .field("indentation", &self.indentation)
            .field("max_depth", &self.max_depth)
            .field("type_name_handling", &self.type_name_handling)
            .field("preserve_references", &self.preserve_references)
            .field("reference_loop_handling", &self.reference_loop_handling)
            .field("object_creation_handling", &self.object_creation_handling)
            .field("null_value_handling", &self.null_value_handling)
            .field("default_value_handling", &self.default_value_handling)
            .field("missing_member_handling", &self.missing_member_handling)
            .field("converters_len", &self.converters.len())
            .field("has_error_callback", &self.error_callback.is_some())
            .field("has_trace_hook", &self.trace_hook.is_some())
            .finish()
    }
}

/// Converts between object graphs and JSON token streams
///
/// A mapper is cheap to share; its contract resolver cache is read-mostly and safe
/// for concurrent lookups. A single serialize or deserialize *call* however mutates
/// its own per-call state (reference table, depth), so one graph/reader/writer must
/// not be used by multiple concurrent operations.
pub struct JsonMapper {
    pub(crate) settings: MapperSettings,
    pub(crate) resolver: Arc<dyn ContractResolver>,
    pub(crate) binder: Arc<dyn TypeBinder>,
}

impl JsonMapper {
    /// Creates a mapper with [default settings](MapperSettings::new) and the
    /// [`DefaultBinder`]
    pub fn new(resolver: Arc<dyn ContractResolver>) -> Self {
        JsonMapper::new_custom(resolver, MapperSettings::new())
    }

    /// Creates a mapper with custom settings
    pub fn new_custom(resolver: Arc<dyn ContractResolver>, settings: MapperSettings) -> Self {
        JsonMapper {
            settings,
            resolver,
            binder: Arc::new(DefaultBinder),
        }
    }

    /// Replaces the type binder
    pub fn with_binder(mut self, binder: Arc<dyn TypeBinder>) -> Self {
        self.binder = binder;
        self
    }

    /// Gets the settings of this mapper
    pub fn settings(&self) -> &MapperSettings {
        &self.settings
    }

    /// Serializes the node into the writer
    pub fn serialize<W: Write>(
        &self,
        graph: &Graph,
        root: NodeId,
        writer: &mut JsonTextWriter<W>,
    ) -> Result<(), SerError> {
        self.serialize_tokens(graph, root, writer)
    }

    /// Serializes the node into any token sink
    pub fn serialize_tokens(
        &self,
        graph: &Graph,
        root: NodeId,
        writer: &mut dyn TokenWrite,
    ) -> Result<(), SerError> {
        serialize::write_root(self, graph, root, writer)
    }

    /// Deserializes the next value from the reader into a new node
    pub fn deserialize<S: ByteSource>(
        &self,
        graph: &mut Graph,
        reader: &mut JsonTextReader<S>,
    ) -> Result<NodeId, SerError> {
        self.deserialize_tokens(graph, reader)
    }

    /// Deserializes the next value from any token source into a new node
    pub fn deserialize_tokens(
        &self,
        graph: &mut Graph,
        reader: &mut dyn TokenRead,
    ) -> Result<NodeId, SerError> {
        deserialize::read_root(self, graph, reader, &DeclaredType::Any, None)
    }

    /// Deserializes the next value, expecting an instance of the named type
    pub fn deserialize_typed(
        &self,
        graph: &mut Graph,
        reader: &mut dyn TokenRead,
        type_tag: &str,
    ) -> Result<NodeId, SerError> {
        deserialize::read_root(self, graph, reader, &DeclaredType::named(type_tag), None)
    }

    /// Populates an existing node from the reader instead of constructing a new one
    ///
    /// Existing object members are merged into and existing arrays are appended to
    /// when [`object_creation_handling`](MapperSettings::object_creation_handling)
    /// is [`Reuse`](ObjectCreationHandling::Reuse); otherwise member values are
    /// replaced.
    pub fn populate(
        &self,
        graph: &mut Graph,
        reader: &mut dyn TokenRead,
        target: NodeId,
    ) -> Result<(), SerError> {
        let declared = match graph.type_tag(target) {
            Some(tag) => DeclaredType::named(tag),
            None => DeclaredType::Any,
        };
        deserialize::read_root(self, graph, reader, &declared, Some(target))?;
        Ok(())
    }

    /// Serializes the node to a JSON string
    ///
    /// The writer is configured from this mapper's settings (indentation, date
    /// format, non-finite handling).
    pub fn to_string(&self, graph: &Graph, root: NodeId) -> Result<String, SerError> {
        let mut writer = JsonTextWriter::new_custom(Vec::new(), self.writer_settings());
        self.serialize(graph, root, &mut writer)?;
        let bytes = writer
            .close()?
            .expect("close_output is disabled for the internal writer");
        Ok(utf8::to_string_unchecked(bytes))
    }

    /// Deserializes a JSON string into a new node
    ///
    /// The reader is configured from this mapper's settings (max depth, date and
    /// float parsing); comments are skipped.
    pub fn parse_str(&self, graph: &mut Graph, json: &str) -> Result<NodeId, SerError> {
        let mut reader =
            JsonTextReader::new_custom(SliceSource::new(json.as_bytes()), self.reader_settings());
        self.deserialize(graph, &mut reader)
    }

    /// Deserializes a JSON string, expecting an instance of the named type
    pub fn parse_typed(
        &self,
        graph: &mut Graph,
        json: &str,
        type_tag: &str,
    ) -> Result<NodeId, SerError> {
        let mut reader =
            JsonTextReader::new_custom(SliceSource::new(json.as_bytes()), self.reader_settings());
        self.deserialize_typed(graph, &mut reader, type_tag)
    }

    fn reader_settings(&self) -> ReaderSettings {
        ReaderSettings {
            max_depth: self.settings.max_depth,
            // The mapper treats comments as transparent
            comment_handling: CommentHandling::Skip,
            date_parse_handling: self.settings.date_parse_handling,
            float_parse_handling: self.settings.float_parse_handling,
            // Allow reading the literals back which NonFiniteHandling::Literal writes
            allow_non_finite_numbers: self.settings.non_finite_handling
                == NonFiniteHandling::Literal,
            ..Default::default()
        }
    }

    fn writer_settings(&self) -> WriterSettings {
        WriterSettings {
            indentation: self.settings.indentation.clone(),
            non_finite_handling: self.settings.non_finite_handling,
            date_format_handling: self.settings.date_format_handling,
            escape_non_ascii: false,
            close_output: false,
        }
    }
}

impl Debug for JsonMapper {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonMapper")
            .field("settings", &self.settings)
            .finish()
    }
}
