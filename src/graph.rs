//! The arena value graph the mapper operates on
//!
//! A [`Graph`] owns all nodes of an object graph; nodes address each other through
//! [`NodeId`] indexes instead of references. Object identity — the basis for
//! `$id`/`$ref` reference preservation and cycle detection — is the arena index,
//! never structural equality. Cyclic graphs are expressed simply by repeating a
//! `NodeId` somewhere below itself.

use std::collections::HashSet;

use bigdecimal::BigDecimal;
use chrono::{DateTime, FixedOffset};
use duplicate::duplicate_item;
use indexmap::IndexMap;
use num_bigint::BigInt;
use thiserror::Error;

use crate::reader::{JsonSyntaxError, ReaderError, SyntaxErrorKind, TokenRead};
use crate::token::Token;
use crate::writer::{TokenWrite, WriterError};

/// Index based handle to a [`Node`] in a [`Graph`]
///
/// Handles are cheap to copy and do not keep the node alive; they are only
/// meaningful together with the graph they were created by.
#[derive(PartialEq, Eq, Clone, Copy, Hash, Debug)]
pub struct NodeId(u32);

impl NodeId {
    /// Index of the node within its graph
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A value in the graph
#[derive(PartialEq, Clone, Debug)]
pub enum Node {
    /// JSON null
    Null,
    /// The non-standard `undefined` value
    Undefined,
    /// Boolean value
    Bool(bool),
    /// Integer number value
    Int(i64),
    /// Integer number value which does not fit in an `i64`
    BigInt(BigInt),
    /// Floating point number value
    Float(f64),
    /// Fixed-point decimal number value
    Decimal(BigDecimal),
    /// String value
    Str(String),
    /// Date value
    Date(DateTime<FixedOffset>),
    /// Byte array value; written as base64 string
    Bytes(Vec<u8>),
    /// A comment preserved from the input
    ///
    /// Only created when reading with [`CommentHandling::Emit`](crate::reader::CommentHandling::Emit);
    /// the mapper treats comments as transparent and never writes them.
    Comment(String),
    /// Array of values
    Array(Vec<NodeId>),
    /// Object with ordered named members
    Object {
        /// Registered type this object is an instance of, if any
        ///
        /// Untyped objects are mapped dynamically; typed objects go through the
        /// [contract](crate::contract::Contract) registered for the tag.
        type_tag: Option<String>,
        /// Members in declaration order
        members: IndexMap<String, NodeId>,
    },
}

impl Node {
    /// Creates an empty untyped object node
    pub fn object() -> Node {
        Node::Object {
            type_tag: None,
            members: IndexMap::new(),
        }
    }

    /// Creates an empty object node with a type tag
    pub fn typed_object(type_tag: impl Into<String>) -> Node {
        Node::Object {
            type_tag: Some(type_tag.into()),
            members: IndexMap::new(),
        }
    }

    /// Whether this node is an array or object
    pub fn is_container(&self) -> bool {
        matches!(self, Node::Array(_) | Node::Object { .. })
    }
}

// Creates a `Node::Int` from the integer
#[duplicate_item(type_template; [u8]; [i8]; [u16]; [i16]; [u32]; [i32]; [i64])]
impl From<type_template> for Node {
    fn from(v: type_template) -> Self {
        Node::Int(v.into())
    }
}

// Creates a `Node::Float` from the number
#[duplicate_item(type_template; [f32]; [f64])]
impl From<type_template> for Node {
    fn from(v: type_template) -> Self {
        Node::Float(v.into())
    }
}

impl From<bool> for Node {
    fn from(v: bool) -> Self {
        Node::Bool(v)
    }
}

impl From<&str> for Node {
    fn from(v: &str) -> Self {
        Node::Str(v.to_owned())
    }
}

impl From<String> for Node {
    fn from(v: String) -> Self {
        Node::Str(v)
    }
}

impl From<BigInt> for Node {
    fn from(v: BigInt) -> Self {
        Node::BigInt(v)
    }
}

impl From<BigDecimal> for Node {
    fn from(v: BigDecimal) -> Self {
        Node::Decimal(v)
    }
}

impl From<DateTime<FixedOffset>> for Node {
    fn from(v: DateTime<FixedOffset>) -> Self {
        Node::Date(v)
    }
}

impl From<Vec<u8>> for Node {
    fn from(v: Vec<u8>) -> Self {
        Node::Bytes(v)
    }
}

/// Error which occurred while [replaying a node's tokens](Graph::write_value)
#[derive(Error, Debug)]
pub enum NodeWriteError {
    /// Error of the underlying JSON writer
    #[error("writer error: {0}")]
    Writer(#[from] WriterError),
    /// The node graph contains a cycle
    ///
    /// Cyclic graphs can only be written through the mapper with reference
    /// preservation enabled.
    #[error("Self referencing loop detected. Path '{path}'.")]
    Cycle {
        /// Dotted path at which the already-active node was encountered again
        path: String,
    },
}

/// Arena holding the nodes of one or more object graphs
#[derive(Clone, Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
}

impl Graph {
    /// Creates an empty graph
    pub fn new() -> Self {
        Graph::default()
    }

    /// Number of nodes in the graph
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph contains no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Adds a node and returns its handle
    pub fn insert(&mut self, node: impl Into<Node>) -> NodeId {
        let id = NodeId(u32::try_from(self.nodes.len()).expect("graph node count exceeds u32"));
        self.nodes.push(node.into());
        id
    }

    /// Gets the node for a handle
    ///
    /// # Panics
    /// Panics when the handle was not created by this graph.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Gets the node for a handle mutably
    ///
    /// # Panics
    /// Panics when the handle was not created by this graph.
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    /// Sets a member on an object node
    ///
    /// # Panics
    /// Panics when `object` is not an object node.
    pub fn set_member(&mut self, object: NodeId, name: impl Into<String>, value: NodeId) {
        match self.node_mut(object) {
            Node::Object { members, .. } => {
                members.insert(name.into(), value);
            }
            _ => panic!("Incorrect graph usage: Cannot set member on non-object node"),
        }
    }

    /// Gets a member of an object node
    pub fn member(&self, object: NodeId, name: &str) -> Option<NodeId> {
        match self.node(object) {
            Node::Object { members, .. } => members.get(name).copied(),
            _ => None,
        }
    }

    /// Appends an item to an array node
    ///
    /// # Panics
    /// Panics when `array` is not an array node.
    pub fn push_item(&mut self, array: NodeId, item: NodeId) {
        match self.node_mut(array) {
            Node::Array(items) => items.push(item),
            _ => panic!("Incorrect graph usage: Cannot push item on non-array node"),
        }
    }

    /// Gets the items of an array node
    pub fn items(&self, array: NodeId) -> &[NodeId] {
        match self.node(array) {
            Node::Array(items) => items,
            _ => &[],
        }
    }

    /// Gets the type tag of an object node
    pub fn type_tag(&self, id: NodeId) -> Option<&str> {
        match self.node(id) {
            Node::Object { type_tag, .. } => type_tag.as_deref(),
            _ => None,
        }
    }

    /// Structural equality between a node of this graph and a node of another graph
    ///
    /// Member order of objects is ignored. Cycles are handled: two nodes which are
    /// already being compared further up the walk are considered equal.
    pub fn deep_eq(&self, a: NodeId, other: &Graph, b: NodeId) -> bool {
        fn eq(
            g1: &Graph,
            a: NodeId,
            g2: &Graph,
            b: NodeId,
            visiting: &mut HashSet<(NodeId, NodeId)>,
        ) -> bool {
            if !visiting.insert((a, b)) {
                return true;
            }
            let result = match (g1.node(a), g2.node(b)) {
                (Node::Array(items_a), Node::Array(items_b)) => {
                    items_a.len() == items_b.len()
                        && items_a
                            .iter()
                            .zip(items_b)
                            .all(|(&ia, &ib)| eq(g1, ia, g2, ib, visiting))
                }
                (
                    Node::Object {
                        type_tag: tag_a,
                        members: members_a,
                    },
                    Node::Object {
                        type_tag: tag_b,
                        members: members_b,
                    },
                ) => {
                    tag_a == tag_b
                        && members_a.len() == members_b.len()
                        && members_a.iter().all(|(name, &ma)| {
                            members_b
                                .get(name)
                                .map_or(false, |&mb| eq(g1, ma, g2, mb, visiting))
                        })
                }
                (node_a, node_b) => node_a == node_b,
            };
            visiting.remove(&(a, b));
            result
        }

        eq(self, a, other, b, &mut HashSet::new())
    }

    /// Materializes exactly one value's worth of tokens from the reader into nodes
    ///
    /// Depth is bounded by the reader's own
    /// [`max_depth`](crate::reader::ReaderSettings::max_depth). Comments are
    /// preserved as [`Node::Comment`] array items when the reader emits them;
    /// comments at positions where a node cannot be attached (inside objects,
    /// in front of the value) are dropped.
    pub fn read_value(&mut self, reader: &mut dyn TokenRead) -> Result<NodeId, ReaderError> {
        // Stack of open containers, with the pending member name for objects
        let mut containers: Vec<(NodeId, Option<String>)> = Vec::new();

        loop {
            let token = match reader.advance()? {
                Some(token) => token,
                None => {
                    return Err(ReaderError::Syntax(JsonSyntaxError {
                        kind: SyntaxErrorKind::UnexpectedEnd,
                        path: reader.path(),
                        line: reader.line(),
                        position: reader.position(),
                    }));
                }
            };

            let node = match token {
                Token::Comment(text) => {
                    // Attachable only as array item
                    if let Some(&(parent, _)) = containers.last() {
                        if matches!(self.node(parent), Node::Array(_)) {
                            let id = self.insert(Node::Comment(text));
                            self.push_item(parent, id);
                        }
                    }
                    continue;
                }
                Token::Name(name) => {
                    if let Some((_, pending_name)) = containers.last_mut() {
                        *pending_name = Some(name);
                    }
                    continue;
                }
                Token::BeginObject => {
                    let id = self.insert(Node::object());
                    // At the root this is a no-op; completion is signalled by the
                    // matching end token instead
                    self.attach(&mut containers, id);
                    containers.push((id, None));
                    continue;
                }
                Token::BeginArray => {
                    let id = self.insert(Node::Array(Vec::new()));
                    self.attach(&mut containers, id);
                    containers.push((id, None));
                    continue;
                }
                Token::EndObject | Token::EndArray => {
                    let (id, _) = containers.pop().expect("container stack cannot be empty");
                    if containers.is_empty() {
                        return Ok(id);
                    }
                    continue;
                }
                scalar => node_from_token(scalar),
            };

            let id = self.insert(node);
            if self.attach(&mut containers, id) {
                return Ok(id);
            }
        }
    }

    /// Attaches a node to the innermost open container; returns `true` when there
    /// is no open container, that means the node is the complete value
    fn attach(&mut self, containers: &mut [(NodeId, Option<String>)], id: NodeId) -> bool {
        match containers.last_mut() {
            None => true,
            Some((parent, pending_name)) => {
                let parent = *parent;
                match pending_name.take() {
                    Some(name) => self.set_member(parent, name, id),
                    None => self.push_item(parent, id),
                }
                false
            }
        }
    }

    /// Replays a node's tokens into the writer
    ///
    /// The traversal is iterative, so deep graphs do not exhaust the call stack.
    /// Cyclic graphs are rejected with [`NodeWriteError::Cycle`]; writing graphs
    /// with shared or cyclic nodes under reference preservation is the mapper's
    /// job, not this method's. [`Node::Comment`] nodes are skipped.
    pub fn write_value(
        &self,
        root: NodeId,
        writer: &mut dyn TokenWrite,
    ) -> Result<(), NodeWriteError> {
        enum Work<'a> {
            Value(NodeId),
            Name(&'a str),
            End(NodeId, Token),
        }

        let mut active: HashSet<NodeId> = HashSet::new();
        let mut stack = vec![Work::Value(root)];

        while let Some(work) = stack.pop() {
            match work {
                Work::Name(name) => writer.write_name(name)?,
                Work::End(id, token) => {
                    active.remove(&id);
                    writer.write_token(&token)?;
                }
                Work::Value(id) => match self.node(id) {
                    Node::Comment(_) => {}
                    Node::Str(value) => writer.write_string(value)?,
                    Node::Array(items) => {
                        if !active.insert(id) {
                            return Err(NodeWriteError::Cycle {
                                path: writer.path(),
                            });
                        }
                        writer.write_token(&Token::BeginArray)?;
                        stack.push(Work::End(id, Token::EndArray));
                        for &item in items.iter().rev() {
                            stack.push(Work::Value(item));
                        }
                    }
                    Node::Object { members, .. } => {
                        if !active.insert(id) {
                            return Err(NodeWriteError::Cycle {
                                path: writer.path(),
                            });
                        }
                        writer.write_token(&Token::BeginObject)?;
                        stack.push(Work::End(id, Token::EndObject));
                        for (name, &member) in members.iter().rev() {
                            stack.push(Work::Value(member));
                            stack.push(Work::Name(name));
                        }
                    }
                    scalar => {
                        let token = token_from_node(scalar)
                            .expect("scalar nodes always map to a token");
                        writer.write_token(&token)?;
                    }
                },
            }
        }
        Ok(())
    }
}

/// Converts a scalar token into a node
///
/// # Panics
/// Panics for structural tokens and [`Token::Raw`]; raw fragments cannot be
/// materialized without parsing them.
pub(crate) fn node_from_token(token: Token) -> Node {
    match token {
        Token::String(value) => Node::Str(value),
        Token::Int(value) => Node::Int(value),
        Token::BigInt(value) => Node::BigInt(value),
        Token::Float(value) => Node::Float(value),
        Token::Decimal(value) => Node::Decimal(value),
        Token::Bool(value) => Node::Bool(value),
        Token::Null => Node::Null,
        Token::Undefined => Node::Undefined,
        Token::Date(value) => Node::Date(value),
        Token::Bytes(value) => Node::Bytes(value),
        Token::Comment(text) => Node::Comment(text),
        Token::BeginObject
        | Token::EndObject
        | Token::BeginArray
        | Token::EndArray
        | Token::Name(_)
        | Token::Raw(_) => {
            panic!("Incorrect usage: Token {:?} is not a scalar value", token.kind())
        }
    }
}

/// Converts a scalar node into a token; `None` for containers and comments
pub(crate) fn token_from_node(node: &Node) -> Option<Token> {
    Some(match node {
        Node::Null => Token::Null,
        Node::Undefined => Token::Undefined,
        Node::Bool(value) => Token::Bool(*value),
        Node::Int(value) => Token::Int(*value),
        Node::BigInt(value) => Token::BigInt(value.clone()),
        Node::Float(value) => Token::Float(*value),
        Node::Decimal(value) => Token::Decimal(value.clone()),
        Node::Str(value) => Token::String(value.clone()),
        Node::Date(value) => Token::Date(*value),
        Node::Bytes(value) => Token::Bytes(value.clone()),
        Node::Comment(_) | Node::Array(_) | Node::Object { .. } => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::JsonTextReader;
    use crate::writer::JsonTextWriter;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn building_and_access() {
        let mut graph = Graph::new();
        let object = graph.insert(Node::typed_object("point"));
        let x = graph.insert(1);
        let y = graph.insert(2.5);
        graph.set_member(object, "x", x);
        graph.set_member(object, "y", y);

        assert_eq!(Some("point"), graph.type_tag(object));
        assert_eq!(Some(x), graph.member(object, "x"));
        assert_eq!(&Node::Int(1), graph.node(x));
        assert_eq!(&Node::Float(2.5), graph.node(y));
        assert_eq!(None, graph.member(object, "z"));
        assert_eq!(3, graph.len());
    }

    #[test]
    fn node_conversions() {
        assert_eq!(Node::Int(5), Node::from(5_u8));
        assert_eq!(Node::Int(-5), Node::from(-5_i64));
        assert_eq!(Node::Float(1.5), Node::from(1.5_f64));
        assert_eq!(Node::Bool(true), Node::from(true));
        assert_eq!(Node::Str("a".to_owned()), Node::from("a"));
        assert_eq!(Node::Bytes(vec![1, 2]), Node::from(vec![1_u8, 2]));
    }

    #[test]
    fn structural_equality() {
        let mut g1 = Graph::new();
        let o1 = g1.insert(Node::object());
        let a1 = g1.insert(1);
        let b1 = g1.insert("x");
        g1.set_member(o1, "a", a1);
        g1.set_member(o1, "b", b1);

        let mut g2 = Graph::new();
        let o2 = g2.insert(Node::object());
        let b2 = g2.insert("x");
        let a2 = g2.insert(1);
        // Member order differs; structural equality ignores it
        g2.set_member(o2, "b", b2);
        g2.set_member(o2, "a", a2);

        assert_eq!(true, g1.deep_eq(o1, &g2, o2));

        let c2 = g2.insert(2);
        g2.set_member(o2, "c", c2);
        assert_eq!(false, g1.deep_eq(o1, &g2, o2));
    }

    #[test]
    fn cyclic_equality_terminates() {
        let mut g1 = Graph::new();
        let o1 = g1.insert(Node::object());
        g1.set_member(o1, "me", o1);

        let mut g2 = Graph::new();
        let o2 = g2.insert(Node::object());
        g2.set_member(o2, "me", o2);

        assert_eq!(true, g1.deep_eq(o1, &g2, o2));
    }

    #[test]
    fn identity_is_index_based() {
        let mut graph = Graph::new();
        let a = graph.insert(1);
        let b = graph.insert(1);
        // Equal values, distinct identities
        assert_ne!(a, b);
        assert_eq!(graph.node(a), graph.node(b));
    }

    #[test]
    fn materialize_value() -> TestResult {
        let mut reader = JsonTextReader::from_str(r#"{"a": [1, true, null], "b": {"c": "x"}}"#);
        let mut graph = Graph::new();
        let root = graph.read_value(&mut reader)?;

        let a = graph.member(root, "a").unwrap();
        assert_eq!(3, graph.items(a).len());
        assert_eq!(&Node::Int(1), graph.node(graph.items(a)[0]));
        assert_eq!(&Node::Bool(true), graph.node(graph.items(a)[1]));
        assert_eq!(&Node::Null, graph.node(graph.items(a)[2]));
        let b = graph.member(root, "b").unwrap();
        let c = graph.member(b, "c").unwrap();
        assert_eq!(&Node::Str("x".to_owned()), graph.node(c));
        Ok(())
    }

    #[test]
    fn materialize_partial_document() -> TestResult {
        // Only one value is consumed, the rest of the document stays available
        let mut reader = JsonTextReader::from_str("[[1], 2]");
        assert_eq!(Some(Token::BeginArray), reader.advance()?);

        let mut graph = Graph::new();
        let inner = graph.read_value(&mut reader)?;
        assert_eq!(1, graph.items(inner).len());

        assert_eq!(Some(Token::Int(2)), reader.advance()?);
        assert_eq!(Some(Token::EndArray), reader.advance()?);
        Ok(())
    }

    #[test]
    fn materialize_preserves_array_comments() -> TestResult {
        let mut reader = JsonTextReader::from_str("[1, /* note */ 2]");
        let mut graph = Graph::new();
        let root = graph.read_value(&mut reader)?;

        let items = graph.items(root).to_vec();
        assert_eq!(3, items.len());
        assert_eq!(&Node::Comment(" note ".to_owned()), graph.node(items[1]));
        Ok(())
    }

    #[test]
    fn replay_value() -> TestResult {
        let mut reader = JsonTextReader::from_str(r#"{"a": [1, 2.5, "x"], "b": null}"#);
        let mut graph = Graph::new();
        let root = graph.read_value(&mut reader)?;

        let mut writer = JsonTextWriter::new(Vec::new());
        graph.write_value(root, &mut writer)?;
        let json = String::from_utf8(writer.close()?.unwrap())?;
        assert_eq!(r#"{"a":[1,2.5,"x"],"b":null}"#, json);
        Ok(())
    }

    #[test]
    fn replay_skips_comments() -> TestResult {
        let mut reader = JsonTextReader::from_str("[1, /* note */ 2]");
        let mut graph = Graph::new();
        let root = graph.read_value(&mut reader)?;

        let mut writer = JsonTextWriter::new(Vec::new());
        graph.write_value(root, &mut writer)?;
        let json = String::from_utf8(writer.close()?.unwrap())?;
        assert_eq!("[1,2]", json);
        Ok(())
    }

    #[test]
    fn replay_rejects_cycles() -> TestResult {
        let mut graph = Graph::new();
        let object = graph.insert(Node::object());
        let array = graph.insert(Node::Array(Vec::new()));
        graph.set_member(object, "items", array);
        graph.push_item(array, object);

        let mut writer = JsonTextWriter::new(Vec::new());
        match graph.write_value(object, &mut writer) {
            Err(e @ NodeWriteError::Cycle { .. }) => {
                assert_eq!(
                    "Self referencing loop detected. Path 'items[0]'.",
                    e.to_string()
                );
            }
            result => panic!("Expected cycle error, got: {result:?}"),
        }
        Ok(())
    }

    #[test]
    fn shared_node_is_written_twice() -> TestResult {
        // Sharing without a cycle is allowed here; the mapper decides whether
        // to emit references instead
        let mut graph = Graph::new();
        let shared = graph.insert("s");
        let array = graph.insert(Node::Array(vec![shared, shared]));

        let mut writer = JsonTextWriter::new(Vec::new());
        graph.write_value(array, &mut writer)?;
        let json = String::from_utf8(writer.close()?.unwrap())?;
        assert_eq!(r#"["s","s"]"#, json);
        Ok(())
    }
}
