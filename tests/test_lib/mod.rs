#![allow(dead_code)]

use std::sync::Arc;

use mapson::contract::{
    DefaultContractResolver, MemberSpec, PrimitiveKind, TypeDescriptor, TypeRegistry,
};
use mapson::graph::{Graph, Node, NodeId};
use mapson::ser::{JsonMapper, MapperSettings};

/// Registers the primitive types and the object types shared by the tests
pub fn sample_registry() -> TypeRegistry {
    let mut registry = TypeRegistry::new();
    registry.register(TypeDescriptor::primitive("int", PrimitiveKind::Int));
    registry.register(TypeDescriptor::primitive("bigint", PrimitiveKind::BigInt));
    registry.register(TypeDescriptor::primitive("float", PrimitiveKind::Float));
    registry.register(TypeDescriptor::primitive("decimal", PrimitiveKind::Decimal));
    registry.register(TypeDescriptor::primitive("string", PrimitiveKind::String));
    registry.register(TypeDescriptor::primitive("bool", PrimitiveKind::Bool));
    registry.register(TypeDescriptor::primitive("date", PrimitiveKind::Date));
    registry.register(TypeDescriptor::primitive("bytes", PrimitiveKind::Bytes));
    registry.register(TypeDescriptor::object(
        "point",
        vec![
            MemberSpec::new("x").typed("int").required(),
            MemberSpec::new("y").typed("int").required(),
        ],
    ));
    registry
}

pub fn mapper_with(registry: TypeRegistry) -> JsonMapper {
    JsonMapper::new(Arc::new(DefaultContractResolver::new(registry)))
}

pub fn mapper_custom(registry: TypeRegistry, settings: MapperSettings) -> JsonMapper {
    JsonMapper::new_custom(Arc::new(DefaultContractResolver::new(registry)), settings)
}

/// Builds a `point` instance
pub fn build_point(graph: &mut Graph, x: i64, y: i64) -> NodeId {
    let point = graph.insert(Node::typed_object("point"));
    let x = graph.insert(x);
    let y = graph.insert(y);
    graph.set_member(point, "x", x);
    graph.set_member(point, "y", y);
    point
}
