use std::error::Error;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::DateTime;
use num_bigint::BigInt;

use mapson::contract::{MemberSpec, TypeDescriptor, TypeRegistry};
use mapson::graph::{Graph, Node, NodeId};
use mapson::reader::FloatParseHandling;
use mapson::ser::{
    JsonMapper, MapperSettings, PreserveReferences, TypeNameHandling,
};

use crate::test_lib::{mapper_custom, sample_registry};

mod test_lib;

type TestResult = Result<(), Box<dyn Error>>;

fn person_registry() -> TypeRegistry {
    let mut registry = sample_registry();
    registry.register(TypeDescriptor::object(
        "address",
        vec![
            MemberSpec::new("street").typed("string"),
            MemberSpec::new("number").typed("int"),
        ],
    ));
    registry.register(TypeDescriptor::object(
        "person",
        vec![
            MemberSpec::new("name").typed("string").required(),
            MemberSpec::new("age").typed("int"),
            MemberSpec::new("pi").typed("float"),
            MemberSpec::new("big").typed("bigint"),
            MemberSpec::new("avatar").typed("bytes"),
            MemberSpec::new("born").typed("date"),
            MemberSpec::new("address").typed("address"),
            MemberSpec::new("tags"),
            MemberSpec::new("flag").typed("bool"),
            MemberSpec::new("nothing"),
        ],
    ));
    registry
}

fn build_person(graph: &mut Graph) -> Result<NodeId, Box<dyn Error>> {
    let person = graph.insert(Node::typed_object("person"));
    let name = graph.insert("Ada");
    let age = graph.insert(36);
    let pi = graph.insert(3.14);
    let big = graph.insert(Node::BigInt(BigInt::from_str(
        "123456789012345678901234567890",
    )?));
    let avatar = graph.insert(Node::Bytes(vec![0, 1, 2, 254, 255]));
    let born = graph.insert(Node::Date(DateTime::parse_from_rfc3339(
        "1990-05-01T10:30:00Z",
    )?));
    let address = graph.insert(Node::typed_object("address"));
    let street = graph.insert("Main");
    let number = graph.insert(7);
    graph.set_member(address, "street", street);
    graph.set_member(address, "number", number);
    let tag_a = graph.insert("a");
    let tag_b = graph.insert("b");
    let tags = graph.insert(Node::Array(vec![tag_a, tag_b]));
    let flag = graph.insert(true);
    let nothing = graph.insert(Node::Null);

    graph.set_member(person, "name", name);
    graph.set_member(person, "age", age);
    graph.set_member(person, "pi", pi);
    graph.set_member(person, "big", big);
    graph.set_member(person, "avatar", avatar);
    graph.set_member(person, "born", born);
    graph.set_member(person, "address", address);
    graph.set_member(person, "tags", tags);
    graph.set_member(person, "flag", flag);
    graph.set_member(person, "nothing", nothing);
    Ok(person)
}

/// For any acyclic graph, `deserialize(serialize(x))` equals `x` under structural
/// equality, for every combination of type name handling and reference preservation
#[test]
fn typed_round_trip_matrix() -> TestResult {
    let combinations = [
        TypeNameHandling::Off,
        TypeNameHandling::Auto,
        TypeNameHandling::All,
    ]
    .into_iter()
    .flat_map(|type_names| {
        [
            PreserveReferences::Off,
            PreserveReferences::Objects,
            PreserveReferences::Arrays,
            PreserveReferences::All,
        ]
        .into_iter()
        .map(move |preserve| (type_names, preserve))
    });

    for (type_name_handling, preserve_references) in combinations {
        let mapper = mapper_custom(
            person_registry(),
            MapperSettings {
                type_name_handling,
                preserve_references,
                ..MapperSettings::new()
            },
        );

        let mut graph = Graph::new();
        let person = build_person(&mut graph)?;
        let json = mapper.to_string(&graph, person)?;

        let mut parsed_graph = Graph::new();
        let parsed = mapper.parse_typed(&mut parsed_graph, &json, "person")?;
        assert_eq!(
            true,
            graph.deep_eq(person, &parsed_graph, parsed),
            "round trip mismatch for {type_name_handling:?} / {preserve_references:?}; JSON: {json}"
        );
    }
    Ok(())
}

#[test]
fn untyped_round_trip() -> TestResult {
    let mapper = mapper_custom(sample_registry(), MapperSettings::new());

    let mut graph = Graph::new();
    let root = graph.insert(Node::object());
    let numbers = {
        let a = graph.insert(0);
        let b = graph.insert(-17);
        let c = graph.insert(2.25);
        let d = graph.insert(1.0e300);
        graph.insert(Node::Array(vec![a, b, c, d]))
    };
    let text = graph.insert("with \"escapes\" and \u{00E4}\u{20AC}\u{10FFFF}");
    let empty_object = graph.insert(Node::object());
    let empty_array = graph.insert(Node::Array(Vec::new()));
    let yes = graph.insert(true);
    let no = graph.insert(false);
    let null = graph.insert(Node::Null);
    let inner = graph.insert(Node::object());
    graph.set_member(inner, "deep", numbers);
    graph.set_member(root, "numbers", numbers);
    graph.set_member(root, "text", text);
    graph.set_member(root, "empty_object", empty_object);
    graph.set_member(root, "empty_array", empty_array);
    graph.set_member(root, "yes", yes);
    graph.set_member(root, "no", no);
    graph.set_member(root, "null", null);
    graph.set_member(root, "inner", inner);

    let json = mapper.to_string(&graph, root)?;
    let mut parsed_graph = Graph::new();
    let parsed = mapper.parse_str(&mut parsed_graph, &json)?;
    assert_eq!(true, graph.deep_eq(root, &parsed_graph, parsed));
    Ok(())
}

#[test]
fn decimal_round_trip_with_decimal_parsing() -> TestResult {
    let mapper = mapper_custom(
        sample_registry(),
        MapperSettings {
            float_parse_handling: FloatParseHandling::Decimal,
            ..MapperSettings::new()
        },
    );

    let mut graph = Graph::new();
    let root = graph.insert(Node::object());
    let price = graph.insert(Node::Decimal(BigDecimal::from_str("19.90")?));
    let zero = graph.insert(Node::Decimal(BigDecimal::from(0)));
    let count = graph.insert(12);
    graph.set_member(root, "price", price);
    graph.set_member(root, "zero", zero);
    graph.set_member(root, "count", count);

    let json = mapper.to_string(&graph, root)?;
    assert_eq!(r#"{"price":19.90,"zero":0.0,"count":12}"#, json);

    let mut parsed_graph = Graph::new();
    let parsed = mapper.parse_str(&mut parsed_graph, &json)?;
    assert_eq!(true, graph.deep_eq(root, &parsed_graph, parsed));
    Ok(())
}

/// Writing the same value twice with identical settings yields byte-identical output
#[test]
fn idempotent_formatting() -> TestResult {
    for indentation in [None, Some("  ".to_owned())] {
        let mapper = mapper_custom(
            person_registry(),
            MapperSettings {
                indentation,
                type_name_handling: TypeNameHandling::All,
                preserve_references: PreserveReferences::All,
                ..MapperSettings::new()
            },
        );

        let mut graph = Graph::new();
        let person = build_person(&mut graph)?;
        let first = mapper.to_string(&graph, person)?;
        let second = mapper.to_string(&graph, person)?;
        assert_eq!(first, second);
    }
    Ok(())
}

#[test]
fn round_trip_through_second_mapper_instance() -> TestResult {
    // The payload is self-contained; a different mapper instance with the same
    // registry shape reads it back
    let writer_mapper = mapper_custom(
        person_registry(),
        MapperSettings {
            type_name_handling: TypeNameHandling::All,
            ..MapperSettings::new()
        },
    );
    let reader_mapper: JsonMapper = mapper_custom(
        person_registry(),
        MapperSettings {
            type_name_handling: TypeNameHandling::All,
            ..MapperSettings::new()
        },
    );

    let mut graph = Graph::new();
    let person = build_person(&mut graph)?;
    let json = writer_mapper.to_string(&graph, person)?;

    let mut parsed_graph = Graph::new();
    let parsed = reader_mapper.parse_str(&mut parsed_graph, &json)?;
    assert_eq!(true, graph.deep_eq(person, &parsed_graph, parsed));
    Ok(())
}
