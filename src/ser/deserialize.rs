//! The deserialize walk: reader tokens to graph nodes

use std::str::FromStr;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bigdecimal::BigDecimal;
use chrono::SecondsFormat;
use num_bigint::BigInt;

use crate::contract::{Contract, DeclaredType, MemberContract, PrimitiveKind};
use crate::convert::find_converter;
use crate::graph::{node_from_token, Graph, Node, NodeId};
use crate::reader::{try_parse_date, JsonSyntaxError, ReaderError, SyntaxErrorKind, TokenRead};
use crate::token::Token;

use super::references::{DeRefs, Fixup, Slot};
use super::serialize::contract_error;
use super::{
    ErrorContext, JsonMapper, MissingMemberHandling, NullValueHandling, ObjectCreationHandling,
    SerError, TraceEvent, TraceKind,
};

pub(crate) struct DeCursor<'e> {
    reader: &'e mut dyn TokenRead,
    mapper: &'e JsonMapper,
    refs: DeRefs,
    /// One-token pushback buffer so converters and loops can look ahead
    peeked: Option<Token>,
}

impl DeCursor<'_> {
    /// Next token, with comments skipped; the mapper treats them as transparent
    fn next(&mut self) -> Result<Token, SerError> {
        if let Some(token) = self.peeked.take() {
            return Ok(token);
        }
        loop {
            match self.reader.advance()? {
                Some(Token::Comment(_)) => continue,
                Some(token) => return Ok(token),
                None => {
                    return Err(SerError::Reader(ReaderError::Syntax(JsonSyntaxError {
                        kind: SyntaxErrorKind::UnexpectedEnd,
                        path: self.reader.path(),
                        line: self.reader.line(),
                        position: self.reader.position(),
                    })));
                }
            }
        }
    }

    fn peek(&mut self) -> Result<&Token, SerError> {
        if self.peeked.is_none() {
            let token = self.next()?;
            self.peeked = Some(token);
        }
        Ok(self.peeked.as_ref().expect("peeked was just filled"))
    }

    /// Skips the next complete value
    fn skip_next_value(&mut self) -> Result<(), SerError> {
        let mut depth = 0_usize;
        loop {
            match self.next()? {
                Token::Name(_) | Token::Comment(_) => {}
                Token::BeginObject | Token::BeginArray => depth += 1,
                Token::EndObject | Token::EndArray => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                _ => {
                    if depth == 0 {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Consumes tokens until the reader is back at the given depth
    ///
    /// Used after a handled recoverable error so the remainder of the offending
    /// element's tokens are discarded and the surrounding container continues.
    fn recover_to_depth(&mut self, target: usize) -> Result<(), SerError> {
        self.peeked = None;
        while self.reader.depth() > target {
            match self.reader.advance()? {
                Some(_) => {}
                None => break,
            }
        }
        Ok(())
    }

    fn path(&self) -> String {
        self.reader.path()
    }
}

/// Context handed to converters on the read path
///
/// Re-entering the mapper through [`deserialize_value`](Self::deserialize_value)
/// shares the depth budget and reference table of the outer call.
pub struct DeserializeContext<'a, 'e> {
    cursor: &'a mut DeCursor<'e>,
}

impl DeserializeContext<'_, '_> {
    /// Reads the next token, with comments skipped
    pub fn advance(&mut self) -> Result<Token, SerError> {
        self.cursor.next()
    }

    /// Peeks at the next token without consuming it
    pub fn peek(&mut self) -> Result<&Token, SerError> {
        self.cursor.peek()
    }

    /// Deserializes a nested value with default behavior
    pub fn deserialize_value(&mut self, graph: &mut Graph) -> Result<NodeId, SerError> {
        read_slot_value(self.cursor, graph, &DeclaredType::Any, None, None)
    }

    /// Dotted path of the current position
    pub fn path(&self) -> String {
        self.cursor.path()
    }
}

pub(crate) fn read_root(
    mapper: &JsonMapper,
    graph: &mut Graph,
    reader: &mut dyn TokenRead,
    declared: &DeclaredType,
    target: Option<NodeId>,
) -> Result<NodeId, SerError> {
    let mut cursor = DeCursor {
        reader,
        mapper,
        refs: DeRefs::new(),
        peeked: None,
    };
    let root = read_slot_value(&mut cursor, graph, declared, None, target)?;
    // Resolve forward references recorded during the walk
    let refs = std::mem::take(&mut cursor.refs);
    refs.apply(graph)?;
    Ok(root)
}

fn trace(cur: &mut DeCursor<'_>, kind: TraceKind, detail: &str) {
    if let Some(hook) = &cur.mapper.settings.trace_hook {
        hook.as_ref()(&TraceEvent {
            kind,
            path: cur.reader.path(),
            detail: detail.to_owned(),
        });
    }
}

fn check_depth(cur: &DeCursor<'_>) -> Result<(), SerError> {
    if cur.reader.depth() > cur.mapper.settings.max_depth {
        return Err(SerError::DepthExceeded {
            max_depth: cur.mapper.settings.max_depth,
            path: cur.reader.path(),
        });
    }
    Ok(())
}

/// Routes a recoverable error through the error callback; `Ok(true)` means the
/// offending element is skipped
fn handle_recoverable(cur: &mut DeCursor<'_>, e: SerError) -> Result<bool, SerError> {
    if !e.is_recoverable() {
        return Err(e);
    }
    if let Some(callback) = cur.mapper.settings.error_callback.clone() {
        let mut ctx = ErrorContext {
            path: cur.reader.path(),
            message: e.to_string(),
            handled: false,
        };
        callback.as_ref()(&mut ctx);
        if ctx.handled {
            let message = ctx.message;
            trace(cur, TraceKind::Error, &message);
            return Ok(true);
        }
    }
    Err(e)
}

fn mismatch(cur: &DeCursor<'_>, message: String) -> SerError {
    SerError::TypeMismatch {
        message,
        path: cur.path(),
    }
}

/// Reads the next value for a slot, consulting converters before any token is consumed
fn read_slot_value(
    cur: &mut DeCursor<'_>,
    graph: &mut Graph,
    declared: &DeclaredType,
    slot: Option<(NodeId, Slot)>,
    reuse: Option<NodeId>,
) -> Result<NodeId, SerError> {
    if let DeclaredType::Named(tag) = declared {
        if let Some(conv) = find_converter(&cur.mapper.settings.converters, tag, false).cloned() {
            return conv.read(graph, &mut DeserializeContext { cursor: &mut *cur });
        }
        // A registered Custom contract replaces default behavior entirely
        if let Ok(contract) = cur.mapper.resolver.resolve(tag) {
            if let Contract::Custom(conv) = contract.as_ref() {
                if conv.can_read() {
                    let conv = conv.clone();
                    return conv.read(graph, &mut DeserializeContext { cursor: &mut *cur });
                }
            }
        }
    }
    let token = cur.next()?;
    read_value_from(cur, graph, token, declared, slot, reuse)
}

fn read_value_from(
    cur: &mut DeCursor<'_>,
    graph: &mut Graph,
    token: Token,
    declared: &DeclaredType,
    slot: Option<(NodeId, Slot)>,
    reuse: Option<NodeId>,
) -> Result<NodeId, SerError> {
    match token {
        Token::BeginObject => read_object(cur, graph, declared, slot, reuse),
        Token::BeginArray => {
            let element_type = array_element_type(cur, declared)?;
            let id = match reuse {
                Some(target) if matches!(graph.node(target), Node::Array(_)) => target,
                _ => graph.insert(Node::Array(Vec::new())),
            };
            read_array_items(cur, graph, id, &element_type)?;
            Ok(id)
        }
        scalar => coerce_scalar(cur, graph, scalar, declared),
    }
}

/// Element type of an array slot; fails when the declared type is not array-shaped
fn array_element_type(
    cur: &DeCursor<'_>,
    declared: &DeclaredType,
) -> Result<DeclaredType, SerError> {
    match declared {
        DeclaredType::Any => Ok(DeclaredType::Any),
        DeclaredType::Named(tag) => {
            let contract = cur
                .mapper
                .resolver
                .resolve(tag)
                .map_err(|e| contract_error(cur.path(), e))?;
            match contract.as_ref() {
                Contract::Array { element_type } => Ok(element_type.clone()),
                Contract::Dynamic | Contract::Custom(_) => Ok(DeclaredType::Any),
                Contract::Primitive(kind) => Err(mismatch(
                    cur,
                    format!("Cannot deserialize JSON array into primitive type '{kind}'."),
                )),
                Contract::Object(_) | Contract::Dictionary { .. } => Err(mismatch(
                    cur,
                    format!("Cannot deserialize JSON array into type '{tag}'."),
                )),
            }
        }
    }
}

fn read_array_items(
    cur: &mut DeCursor<'_>,
    graph: &mut Graph,
    id: NodeId,
    element_type: &DeclaredType,
) -> Result<(), SerError> {
    check_depth(cur)?;
    trace(cur, TraceKind::Start, "array");
    loop {
        if matches!(cur.peek()?, Token::EndArray) {
            cur.next()?;
            break;
        }
        let index = graph.items(id).len();
        let item_depth = cur.reader.depth();
        match read_slot_value(cur, graph, element_type, Some((id, Slot::Item(index))), None) {
            Ok(item) => graph.push_item(id, item),
            Err(e) => {
                if handle_recoverable(cur, e)? {
                    cur.recover_to_depth(item_depth)?;
                }
            }
        }
    }
    trace(cur, TraceKind::Finish, "array");
    Ok(())
}

fn ref_id_string(cur: &DeCursor<'_>, token: Token) -> Result<String, SerError> {
    match token {
        Token::String(id) => Ok(id),
        Token::Int(id) => Ok(id.to_string()),
        other => Err(mismatch(
            cur,
            format!("Unexpected token {} when reading a reference id.", other.kind()),
        )),
    }
}

fn read_object(
    cur: &mut DeCursor<'_>,
    graph: &mut Graph,
    declared: &DeclaredType,
    slot: Option<(NodeId, Slot)>,
    reuse: Option<NodeId>,
) -> Result<NodeId, SerError> {
    check_depth(cur)?;

    let first_token = cur.next()?;

    // A back-reference replaces the whole value
    if let Token::Name(name) = &first_token {
        if name == "$ref" {
            let id_token = cur.next()?;
            let ref_id = ref_id_string(cur, id_token)?;
            let end = cur.next()?;
            if !matches!(end, Token::EndObject) {
                return Err(SerError::ConversionFailed {
                    message: "Additional content found in JSON reference object.".to_owned(),
                    path: cur.path(),
                });
            }
            return match cur.refs.resolve(&ref_id) {
                Some(node) => Ok(node),
                // Forward reference: hand out a placeholder and patch the slot once
                // the referent finished construction
                None => match slot {
                    Some((container, slot)) => {
                        let placeholder = graph.insert(Node::Null);
                        cur.refs.add_fixup(Fixup {
                            container,
                            slot,
                            id: ref_id,
                            path: cur.path(),
                        });
                        Ok(placeholder)
                    }
                    None => Err(SerError::UnresolvedReference {
                        id: ref_id,
                        path: cur.path(),
                    }),
                },
            };
        }
    }

    // Construct the destination node up front so self references resolve while
    // members are still being populated
    let node_id = match reuse {
        Some(target) if matches!(graph.node(target), Node::Object { .. }) => target,
        _ => graph.insert(Node::object()),
    };
    let mut effective_tag: Option<String> = match declared {
        DeclaredType::Named(tag) => Some(tag.clone()),
        DeclaredType::Any => None,
    };
    let mut contract: Option<Arc<Contract>> = None;

    trace(cur, TraceKind::Start, "object");

    let mut token = first_token;
    loop {
        let name = match token {
            Token::EndObject => break,
            Token::Name(name) => name,
            other => {
                return Err(mismatch(
                    cur,
                    format!("Unexpected token {} when reading an object.", other.kind()),
                ));
            }
        };

        if name == "$id" {
            let value = cur.next()?;
            let id = ref_id_string(cur, value)?;
            // Register before members are populated so self-referential and
            // mutually-referential graphs resolve
            cur.refs.register(id, node_id);
        } else if name == "$type" {
            let value = cur.next()?;
            let type_name = match value {
                Token::String(name) => name,
                other => {
                    return Err(mismatch(
                        cur,
                        format!("Unexpected token {} when reading a type marker.", other.kind()),
                    ));
                }
            };
            match cur.mapper.binder.tag_for(&type_name) {
                Some(tag) => effective_tag = Some(tag),
                None => {
                    return Err(SerError::TypeMismatch {
                        message: format!(
                            "Type specified in JSON '{type_name}' was not resolved by the binder."
                        ),
                        path: cur.path(),
                    });
                }
            }
        } else if name == "$values" {
            // Reference-preserved array wrapper; the node becomes an array
            *graph.node_mut(node_id) = Node::Array(Vec::new());
            let begin = cur.next()?;
            if !matches!(begin, Token::BeginArray) {
                return Err(mismatch(
                    cur,
                    format!("Unexpected token {} when reading $values.", begin.kind()),
                ));
            }
            let element_type = array_element_type(cur, declared)?;
            read_array_items(cur, graph, node_id, &element_type)?;
            let end = cur.next()?;
            if !matches!(end, Token::EndObject) {
                return Err(SerError::ConversionFailed {
                    message: "Additional content found in JSON reference object.".to_owned(),
                    path: cur.path(),
                });
            }
            trace(cur, TraceKind::Finish, "object");
            return Ok(node_id);
        } else {
            ensure_contract(cur, graph, node_id, &effective_tag, &mut contract)?;
            read_member(cur, graph, node_id, name, contract.as_deref(), &effective_tag)?;
        }

        token = cur.next()?;
    }

    ensure_contract(cur, graph, node_id, &effective_tag, &mut contract)?;
    finalize_object(cur, graph, node_id, contract.as_deref())?;
    trace(cur, TraceKind::Finish, "object");
    Ok(node_id)
}

/// Resolves the contract once the effective tag is known, validates its shape and
/// stamps the tag onto the node
fn ensure_contract(
    cur: &mut DeCursor<'_>,
    graph: &mut Graph,
    node_id: NodeId,
    effective_tag: &Option<String>,
    contract: &mut Option<Arc<Contract>>,
) -> Result<(), SerError> {
    if contract.is_some() {
        return Ok(());
    }
    let Some(tag) = effective_tag else {
        return Ok(());
    };
    let resolved = cur
        .mapper
        .resolver
        .resolve(tag)
        .map_err(|e| contract_error(cur.path(), e))?;
    match resolved.as_ref() {
        Contract::Primitive(kind) => {
            return Err(mismatch(
                cur,
                format!("Cannot deserialize JSON object into primitive type '{kind}'."),
            ));
        }
        Contract::Array { .. } => {
            return Err(mismatch(
                cur,
                format!("Cannot deserialize JSON object into array type '{tag}'."),
            ));
        }
        _ => {}
    }
    if let Node::Object { type_tag, .. } = graph.node_mut(node_id) {
        *type_tag = Some(tag.clone());
    }
    *contract = Some(resolved);
    Ok(())
}

fn read_member(
    cur: &mut DeCursor<'_>,
    graph: &mut Graph,
    object: NodeId,
    name: String,
    contract: Option<&Contract>,
    type_tag: &Option<String>,
) -> Result<(), SerError> {
    match contract {
        Some(Contract::Object(object_contract)) => {
            if let Some(member) = object_contract.member(&name) {
                let member = member.clone();
                return read_mapped_member(cur, graph, object, member);
            }
            if let Some(extension) = &object_contract.extension_member {
                // Collect the unmapped member into the catch-all bag
                let extension = extension.clone();
                let bag = match graph.member(object, &extension) {
                    Some(bag) if matches!(graph.node(bag), Node::Object { .. }) => bag,
                    _ => {
                        let bag = graph.insert(Node::object());
                        graph.set_member(object, extension, bag);
                        bag
                    }
                };
                let value = read_slot_value(
                    cur,
                    graph,
                    &DeclaredType::Any,
                    Some((bag, Slot::Member(name.clone()))),
                    None,
                )?;
                graph.set_member(bag, name, value);
                return Ok(());
            }
            match cur.mapper.settings.missing_member_handling {
                MissingMemberHandling::Ignore => cur.skip_next_value(),
                MissingMemberHandling::Error => {
                    let e = SerError::MissingMember {
                        member: name.clone(),
                        type_tag: type_tag.clone().unwrap_or_default(),
                        path: cur.path(),
                        line: cur.reader.line(),
                        position: cur.reader.position(),
                    };
                    if handle_recoverable(cur, e)? {
                        cur.skip_next_value()?;
                    }
                    Ok(())
                }
            }
        }
        Some(Contract::Dictionary { value_type }) => {
            let value_type = value_type.clone();
            let reuse_child = reuse_member(cur, graph, object, &name);
            let value = read_slot_value(
                cur,
                graph,
                &value_type,
                Some((object, Slot::Member(name.clone()))),
                reuse_child,
            )?;
            graph.set_member(object, name, value);
            Ok(())
        }
        _ => {
            let reuse_child = reuse_member(cur, graph, object, &name);
            let value = read_slot_value(
                cur,
                graph,
                &DeclaredType::Any,
                Some((object, Slot::Member(name.clone()))),
                reuse_child,
            )?;
            graph.set_member(object, name, value);
            Ok(())
        }
    }
}

/// The existing member value to merge into, when object creation handling says reuse
fn reuse_member(
    cur: &DeCursor<'_>,
    graph: &Graph,
    object: NodeId,
    name: &str,
) -> Option<NodeId> {
    if cur.mapper.settings.object_creation_handling != ObjectCreationHandling::Reuse {
        return None;
    }
    graph
        .member(object, name)
        .filter(|&child| graph.node(child).is_container())
}

fn read_mapped_member(
    cur: &mut DeCursor<'_>,
    graph: &mut Graph,
    object: NodeId,
    member: MemberContract,
) -> Result<(), SerError> {
    let member_depth = cur.reader.depth();

    let result: Result<NodeId, SerError> = (|| {
        if let Some(conv) = &member.converter {
            if conv.can_read() {
                let conv = conv.clone();
                return conv.read(graph, &mut DeserializeContext { cursor: &mut *cur });
            }
        }
        let reuse_child = if cur.mapper.settings.object_creation_handling
            == ObjectCreationHandling::Reuse
        {
            graph
                .member(object, &member.name)
                .filter(|&child| graph.node(child).is_container())
        } else {
            None
        };
        read_slot_value(
            cur,
            graph,
            &member.declared_type,
            Some((object, Slot::Member(member.name.clone()))),
            reuse_child,
        )
    })();

    match result {
        Ok(value) => {
            let null_handling = member
                .null_handling
                .unwrap_or(cur.mapper.settings.null_value_handling);
            if matches!(graph.node(value), Node::Null) && null_handling == NullValueHandling::Ignore
            {
                // The member keeps its prior or default value
                return Ok(());
            }
            graph.set_member(object, member.name, value);
            Ok(())
        }
        Err(e) => {
            if handle_recoverable(cur, e)? {
                cur.recover_to_depth(member_depth)?;
            }
            Ok(())
        }
    }
}

/// Required-member enforcement and default population after the closing bracket
fn finalize_object(
    cur: &mut DeCursor<'_>,
    graph: &mut Graph,
    id: NodeId,
    contract: Option<&Contract>,
) -> Result<(), SerError> {
    let Some(Contract::Object(object_contract)) = contract else {
        return Ok(());
    };
    for member in &object_contract.members {
        if graph.member(id, &member.name).is_some() {
            continue;
        }
        if member.required {
            let e = SerError::RequiredMemberMissing {
                member: member.name.clone(),
                path: cur.path(),
            };
            // When handled the member falls back to its default below
            handle_recoverable(cur, e)?;
        }
        if let Some(default) = &member.default {
            let value = graph.insert(default.clone());
            graph.set_member(id, member.name.clone(), value);
        }
    }
    Ok(())
}

fn coerce_scalar(
    cur: &mut DeCursor<'_>,
    graph: &mut Graph,
    token: Token,
    declared: &DeclaredType,
) -> Result<NodeId, SerError> {
    match declared {
        DeclaredType::Any => Ok(graph.insert(node_from_token(token))),
        DeclaredType::Named(tag) => {
            let contract = cur
                .mapper
                .resolver
                .resolve(tag)
                .map_err(|e| contract_error(cur.path(), e))?;
            match contract.as_ref() {
                Contract::Primitive(kind) => coerce_primitive(cur, graph, token, *kind),
                // A read-incapable converter falls back to default behavior
                Contract::Dynamic | Contract::Custom(_) => {
                    Ok(graph.insert(node_from_token(token)))
                }
                _ => {
                    if matches!(token, Token::Null) {
                        return Ok(graph.insert(Node::Null));
                    }
                    Err(mismatch(
                        cur,
                        format!(
                            "Cannot deserialize JSON {} into type '{tag}'.",
                            token.kind()
                        ),
                    ))
                }
            }
        }
    }
}

fn coerce_primitive(
    cur: &mut DeCursor<'_>,
    graph: &mut Graph,
    token: Token,
    kind: PrimitiveKind,
) -> Result<NodeId, SerError> {
    let node = match (kind, token) {
        (_, Token::Null) => Node::Null,
        (PrimitiveKind::Bool, Token::Bool(value)) => Node::Bool(value),
        (PrimitiveKind::Int, Token::Int(value)) => Node::Int(value),
        (PrimitiveKind::Int, Token::BigInt(value)) => {
            return Err(mismatch(
                cur,
                format!("JSON integer {value} is too large or small for an Int64."),
            ));
        }
        (PrimitiveKind::Int, Token::Float(value)) => {
            return Err(mismatch(
                cur,
                format!("Input string '{value}' is not a valid integer."),
            ));
        }
        (PrimitiveKind::Int, Token::Decimal(value)) => {
            return Err(mismatch(
                cur,
                format!("Input string '{value}' is not a valid integer."),
            ));
        }
        (PrimitiveKind::BigInt, Token::Int(value)) => Node::BigInt(BigInt::from(value)),
        (PrimitiveKind::BigInt, Token::BigInt(value)) => Node::BigInt(value),
        (PrimitiveKind::Float, Token::Float(value)) => Node::Float(value),
        (PrimitiveKind::Float, Token::Int(value)) => Node::Float(value as f64),
        (PrimitiveKind::Float, Token::BigInt(value)) => {
            match f64::from_str(&value.to_string()) {
                Ok(float) if float.is_finite() => Node::Float(float),
                _ => {
                    return Err(mismatch(
                        cur,
                        format!("JSON integer {value} is too large or small for a Float."),
                    ));
                }
            }
        }
        (PrimitiveKind::Float, Token::Decimal(value)) => {
            match f64::from_str(&value.to_string()) {
                Ok(float) if float.is_finite() => Node::Float(float),
                _ => {
                    return Err(mismatch(
                        cur,
                        format!("Input string '{value}' is not a valid Float."),
                    ));
                }
            }
        }
        (PrimitiveKind::Decimal, Token::Decimal(value)) => Node::Decimal(value),
        (PrimitiveKind::Decimal, Token::Int(value)) => Node::Decimal(BigDecimal::from(value)),
        (PrimitiveKind::Decimal, Token::BigInt(value)) => Node::Decimal(BigDecimal::from(value)),
        // Parse the shortest round-trip form instead of expanding the binary
        // fraction, so 19.9 coerces to the decimal 19.9
        (PrimitiveKind::Decimal, Token::Float(value)) => {
            match BigDecimal::from_str(&value.to_string()) {
                Ok(decimal) => Node::Decimal(decimal),
                Err(_) => {
                    return Err(mismatch(
                        cur,
                        format!("Input string '{value}' is not a valid decimal."),
                    ));
                }
            }
        }
        (PrimitiveKind::String, Token::String(value)) => Node::Str(value),
        (PrimitiveKind::String, Token::Date(value)) => {
            Node::Str(value.to_rfc3339_opts(SecondsFormat::AutoSi, true))
        }
        (PrimitiveKind::Date, Token::Date(value)) => Node::Date(value),
        (PrimitiveKind::Date, Token::String(value)) => match try_parse_date(&value) {
            Some(date) => Node::Date(date),
            None => {
                return Err(mismatch(
                    cur,
                    format!("String '{value}' was not recognized as a valid date."),
                ));
            }
        },
        (PrimitiveKind::Bytes, Token::String(value)) => match BASE64.decode(value.as_bytes()) {
            Ok(bytes) => Node::Bytes(bytes),
            Err(_) => {
                return Err(mismatch(
                    cur,
                    format!("String '{value}' is not valid base64 data."),
                ));
            }
        },
        (PrimitiveKind::Bytes, Token::Bytes(value)) => Node::Bytes(value),
        (kind, token) => {
            return Err(mismatch(
                cur,
                format!(
                    "Unexpected token {} when reading type '{kind}'.",
                    token.kind()
                ),
            ));
        }
    };
    Ok(graph.insert(node))
}
