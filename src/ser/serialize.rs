//! The serialize walk: graph nodes to writer tokens

use std::collections::HashSet;

use crate::contract::{Contract, ContractError, DeclaredType, ObjectContract};
use crate::convert::find_converter;
use crate::graph::{token_from_node, Graph, Node, NodeId};
use crate::token::Token;
use crate::writer::TokenWrite;

use super::references::SerRefs;
use super::{
    DefaultValueHandling, ErrorContext, JsonMapper, NullValueHandling, ReferenceLoopHandling,
    SerError, TraceEvent, TraceKind, TypeNameHandling,
};

pub(crate) struct SerCursor<'e> {
    writer: &'e mut dyn TokenWrite,
    mapper: &'e JsonMapper,
    refs: SerRefs,
    /// Containers on the current walk, for cycle detection
    active: HashSet<NodeId>,
}

/// Context handed to converters on the write path
///
/// Re-entering the mapper through [`serialize_value`](Self::serialize_value) shares
/// the depth budget and reference table of the outer call.
pub struct SerializeContext<'a, 'e> {
    cursor: &'a mut SerCursor<'e>,
}

impl SerializeContext<'_, '_> {
    /// Writes one token
    pub fn write_token(&mut self, token: &Token) -> Result<(), SerError> {
        Ok(self.cursor.writer.write_token(token)?)
    }

    /// Writes an object member name
    pub fn write_name(&mut self, name: &str) -> Result<(), SerError> {
        Ok(self.cursor.writer.write_name(name)?)
    }

    /// Writes a string value
    pub fn write_string(&mut self, value: &str) -> Result<(), SerError> {
        Ok(self.cursor.writer.write_string(value)?)
    }

    /// Serializes a nested value with default behavior
    pub fn serialize_value(&mut self, graph: &Graph, node: NodeId) -> Result<(), SerError> {
        write_value(self.cursor, graph, node, &DeclaredType::Any)
    }

    /// Dotted path of the current position
    pub fn path(&self) -> String {
        self.cursor.writer.path()
    }
}

pub(crate) fn write_root(
    mapper: &JsonMapper,
    graph: &Graph,
    root: NodeId,
    writer: &mut dyn TokenWrite,
) -> Result<(), SerError> {
    let mut cursor = SerCursor {
        writer,
        mapper,
        refs: SerRefs::new(),
        active: HashSet::new(),
    };
    write_value(&mut cursor, graph, root, &DeclaredType::Any)
}

fn trace(cur: &mut SerCursor<'_>, kind: TraceKind, detail: &str) {
    if let Some(hook) = &cur.mapper.settings.trace_hook {
        hook.as_ref()(&TraceEvent {
            kind,
            path: cur.writer.path(),
            detail: detail.to_owned(),
        });
    }
}

fn check_depth(cur: &SerCursor<'_>) -> Result<(), SerError> {
    if cur.writer.depth() >= cur.mapper.settings.max_depth {
        return Err(SerError::DepthExceeded {
            max_depth: cur.mapper.settings.max_depth,
            path: cur.writer.path(),
        });
    }
    Ok(())
}

pub(crate) fn contract_error(path: String, e: ContractError) -> SerError {
    match e {
        ContractError::UnknownType(type_tag) => SerError::UnknownType { type_tag, path },
        ContractError::InvalidDescriptor { type_tag, message } => SerError::ConversionFailed {
            message: format!("Invalid contract for type '{type_tag}': {message}"),
            path,
        },
    }
}

/// Routes a recoverable error through the error callback; `Ok(true)` means the
/// offending element is skipped
fn handle_recoverable(cur: &mut SerCursor<'_>, e: SerError) -> Result<bool, SerError> {
    if !e.is_recoverable() {
        return Err(e);
    }
    if let Some(callback) = cur.mapper.settings.error_callback.clone() {
        let mut ctx = ErrorContext {
            path: cur.writer.path(),
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

fn write_value(
    cur: &mut SerCursor<'_>,
    graph: &Graph,
    id: NodeId,
    declared: &DeclaredType,
) -> Result<(), SerError> {
    let node = graph.node(id);

    // Converter chain first; the tag comes from the node itself or from the slot
    let conv_tag: Option<String> = match node {
        Node::Object {
            type_tag: Some(tag),
            ..
        } => Some(tag.clone()),
        _ => match declared {
            DeclaredType::Named(tag) => Some(tag.clone()),
            DeclaredType::Any => None,
        },
    };
    if let Some(tag) = &conv_tag {
        if let Some(conv) = find_converter(&cur.mapper.settings.converters, tag, true).cloned() {
            return conv.write(graph, id, &mut SerializeContext { cursor: &mut *cur });
        }
        // A registered Custom contract replaces default behavior entirely
        if let Ok(contract) = cur.mapper.resolver.resolve(tag) {
            if let Contract::Custom(conv) = contract.as_ref() {
                if conv.can_write() {
                    let conv = conv.clone();
                    return conv.write(graph, id, &mut SerializeContext { cursor: &mut *cur });
                }
            }
        }
    }

    match node {
        // Comments are transparent for the mapper
        Node::Comment(_) => Ok(()),
        Node::Array(_) => write_array(cur, graph, id, declared),
        Node::Object { .. } => write_object(cur, graph, id, declared),
        scalar => {
            let token = token_from_node(scalar).expect("scalar node always maps to a token");
            Ok(cur.writer.write_token(&token)?)
        }
    }
}

/// Path of a member which is about to be written; its name token is not out yet,
/// so the writer's own path still points at the enclosing object
fn member_error_path(cur: &SerCursor<'_>, member: Option<&str>) -> String {
    let base = cur.writer.path();
    match member {
        None => base,
        Some(name) => {
            if base.is_empty() {
                name.to_owned()
            } else {
                format!("{base}.{name}")
            }
        }
    }
}

/// Whether reference preservation applies to the object, honoring a per-contract override
fn object_preserve(cur: &SerCursor<'_>, graph: &Graph, id: NodeId) -> bool {
    if let Some(tag) = graph.type_tag(id) {
        if let Ok(contract) = cur.mapper.resolver.resolve(tag) {
            if let Contract::Object(object) = contract.as_ref() {
                if let Some(preserve) = object.preserve_references {
                    return preserve;
                }
            }
        }
    }
    cur.mapper.settings.preserve_references.objects()
}

/// Checks whether the value would close a cycle and how the policy handles that;
/// `Ok(true)` means the value is skipped
fn skip_for_loop(
    cur: &mut SerCursor<'_>,
    graph: &Graph,
    id: NodeId,
    member: Option<&str>,
) -> Result<bool, SerError> {
    if !graph.node(id).is_container() || !cur.active.contains(&id) {
        return Ok(false);
    }
    // With reference preservation a repeat becomes a $ref, not a loop
    let preserved = match graph.node(id) {
        Node::Array(_) => cur.mapper.settings.preserve_references.arrays(),
        _ => object_preserve(cur, graph, id),
    };
    if preserved {
        return Ok(false);
    }
    match cur.mapper.settings.reference_loop_handling {
        ReferenceLoopHandling::Serialize => Ok(false),
        ReferenceLoopHandling::Ignore => Ok(true),
        ReferenceLoopHandling::Error => Err(SerError::ReferenceLoop {
            path: member_error_path(cur, member),
        }),
    }
}

/// Validates, before any tokens are written, that the value's shape fits its contract
fn validate_shape(
    cur: &SerCursor<'_>,
    graph: &Graph,
    id: NodeId,
    member: Option<&str>,
) -> Result<(), SerError> {
    if let Some(tag) = graph.type_tag(id) {
        let contract = cur
            .mapper
            .resolver
            .resolve(tag)
            .map_err(|e| contract_error(member_error_path(cur, member), e))?;
        match contract.as_ref() {
            Contract::Primitive(kind) => {
                return Err(SerError::TypeMismatch {
                    message: format!(
                        "Object value cannot be written as primitive type '{kind}'."
                    ),
                    path: member_error_path(cur, member),
                });
            }
            Contract::Array { .. } => {
                return Err(SerError::TypeMismatch {
                    message: format!("Object value cannot be written as array type '{tag}'."),
                    path: member_error_path(cur, member),
                });
            }
            _ => {}
        }
    }
    Ok(())
}

fn write_reference(cur: &mut SerCursor<'_>, ref_id: &str) -> Result<(), SerError> {
    cur.writer.write_token(&Token::BeginObject)?;
    cur.writer.write_name("$ref")?;
    cur.writer.write_string(ref_id)?;
    cur.writer.write_token(&Token::EndObject)?;
    Ok(())
}

/// Element type of an array slot, derived from an array contract if one is declared
fn array_element_type(cur: &SerCursor<'_>, declared: &DeclaredType) -> DeclaredType {
    if let DeclaredType::Named(tag) = declared {
        if let Ok(contract) = cur.mapper.resolver.resolve(tag) {
            if let Contract::Array { element_type } = contract.as_ref() {
                return element_type.clone();
            }
        }
    }
    DeclaredType::Any
}

fn write_array(
    cur: &mut SerCursor<'_>,
    graph: &Graph,
    id: NodeId,
    declared: &DeclaredType,
) -> Result<(), SerError> {
    let preserve = cur.mapper.settings.preserve_references.arrays();
    if preserve {
        if let Some(ref_id) = cur.refs.get(id) {
            let ref_id = ref_id.to_owned();
            return write_reference(cur, &ref_id);
        }
    }
    check_depth(cur)?;
    let element_type = array_element_type(cur, declared);

    cur.active.insert(id);
    trace(cur, TraceKind::Start, "array");
    if preserve {
        // A raw array cannot carry a $id member, so it is wrapped
        let new_id = cur.refs.assign(id);
        cur.writer.write_token(&Token::BeginObject)?;
        cur.writer.write_name("$id")?;
        cur.writer.write_string(&new_id)?;
        cur.writer.write_name("$values")?;
    }
    cur.writer.write_token(&Token::BeginArray)?;
    for index in 0..graph.items(id).len() {
        let item = graph.items(id)[index];
        if skip_for_loop(cur, graph, item, None)? {
            continue;
        }
        if let Err(e) = validate_shape(cur, graph, item, None) {
            if handle_recoverable(cur, e)? {
                continue;
            }
        }
        write_value(cur, graph, item, &element_type)?;
    }
    cur.writer.write_token(&Token::EndArray)?;
    if preserve {
        cur.writer.write_token(&Token::EndObject)?;
    }
    trace(cur, TraceKind::Finish, "array");
    cur.active.remove(&id);
    Ok(())
}

fn write_object(
    cur: &mut SerCursor<'_>,
    graph: &Graph,
    id: NodeId,
    declared: &DeclaredType,
) -> Result<(), SerError> {
    let preserve = object_preserve(cur, graph, id);
    if preserve {
        if let Some(ref_id) = cur.refs.get(id) {
            let ref_id = ref_id.to_owned();
            return write_reference(cur, &ref_id);
        }
    }
    check_depth(cur)?;
    validate_shape(cur, graph, id, None)?;

    let type_tag = graph.type_tag(id).map(str::to_owned);
    let contract = match &type_tag {
        Some(tag) => Some(
            cur.mapper
                .resolver
                .resolve(tag)
                .map_err(|e| contract_error(cur.writer.path(), e))?,
        ),
        None => None,
    };

    cur.active.insert(id);
    trace(cur, TraceKind::Start, "object");
    cur.writer.write_token(&Token::BeginObject)?;
    if preserve {
        let new_id = cur.refs.assign(id);
        cur.writer.write_name("$id")?;
        cur.writer.write_string(&new_id)?;
    }
    if let Some(tag) = &type_tag {
        let emit = match cur.mapper.settings.type_name_handling {
            TypeNameHandling::All => true,
            TypeNameHandling::Auto => {
                !matches!(declared, DeclaredType::Named(declared_tag) if declared_tag == tag)
            }
            TypeNameHandling::Off => false,
        };
        if emit {
            match cur.mapper.binder.name_for(tag) {
                Some(name) => {
                    cur.writer.write_name("$type")?;
                    cur.writer.write_string(&name)?;
                }
                None => {
                    return Err(SerError::TypeMismatch {
                        message: format!("Type name for '{tag}' was not resolved by the binder."),
                        path: cur.writer.path(),
                    });
                }
            }
        }
    }

    match contract.as_deref() {
        Some(Contract::Object(object_contract)) => {
            write_contract_members(cur, graph, id, object_contract)?;
        }
        Some(Contract::Dictionary { value_type }) => {
            write_plain_members(cur, graph, id, value_type)?;
        }
        _ => {
            write_plain_members(cur, graph, id, &DeclaredType::Any)?;
        }
    }

    cur.writer.write_token(&Token::EndObject)?;
    trace(cur, TraceKind::Finish, "object");
    cur.active.remove(&id);
    Ok(())
}

/// Writes every present member as-is, for dictionaries and untyped objects
fn write_plain_members(
    cur: &mut SerCursor<'_>,
    graph: &Graph,
    id: NodeId,
    value_type: &DeclaredType,
) -> Result<(), SerError> {
    let Node::Object { members, .. } = graph.node(id) else {
        unreachable!("write_plain_members is only called for object nodes");
    };
    for (name, &child) in members {
        if skip_for_loop(cur, graph, child, Some(name))? {
            continue;
        }
        if let Err(e) = validate_shape(cur, graph, child, Some(name)) {
            if handle_recoverable(cur, e)? {
                continue;
            }
        }
        cur.writer.write_name(name)?;
        write_value(cur, graph, child, value_type)?;
    }
    Ok(())
}

/// Writes the members an object contract names, in contract order
fn write_contract_members(
    cur: &mut SerCursor<'_>,
    graph: &Graph,
    id: NodeId,
    object_contract: &ObjectContract,
) -> Result<(), SerError> {
    for member in &object_contract.members {
        let Some(child) = graph.member(id, &member.name) else {
            continue;
        };

        let null_handling = member
            .null_handling
            .unwrap_or(cur.mapper.settings.null_value_handling);
        if matches!(graph.node(child), Node::Null) && null_handling == NullValueHandling::Ignore {
            continue;
        }

        let default_handling = member
            .default_handling
            .unwrap_or(cur.mapper.settings.default_value_handling);
        if default_handling == DefaultValueHandling::Ignore {
            if let Some(default) = &member.default {
                if graph.node(child) == default {
                    continue;
                }
            }
        }

        if skip_for_loop(cur, graph, child, Some(&member.name))? {
            continue;
        }
        if let Err(e) = validate_shape(cur, graph, child, Some(&member.name)) {
            if handle_recoverable(cur, e)? {
                continue;
            }
        }

        cur.writer.write_name(&member.name)?;
        if let Some(conv) = &member.converter {
            if conv.can_write() {
                let conv = conv.clone();
                conv.write(graph, child, &mut SerializeContext { cursor: &mut *cur })?;
                continue;
            }
        }
        write_value(cur, graph, child, &member.declared_type)?;
    }

    // Members collected into the extension bag are splatted back as regular members
    if let Some(extension) = &object_contract.extension_member {
        if let Some(bag) = graph.member(id, extension) {
            if let Node::Object {
                members: bag_members,
                ..
            } = graph.node(bag)
            {
                for (name, &child) in bag_members {
                    if skip_for_loop(cur, graph, child, Some(name))? {
                        continue;
                    }
                    cur.writer.write_name(name)?;
                    write_value(cur, graph, child, &DeclaredType::Any)?;
                }
            }
        }
    }
    Ok(())
}
