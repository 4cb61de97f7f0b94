use proptest::prelude::*;

use mapson::graph::{Graph, Node, NodeId};
use mapson::reader::{DateParseHandling, JsonTextReader, ReaderSettings, SliceSource, TokenRead};
use mapson::ser::MapperSettings;
use mapson::token::Token;

use crate::test_lib::{mapper_custom, sample_registry};

mod test_lib;

/// Graph-free value tree used to generate test graphs
#[derive(Clone, Debug)]
enum TestValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<TestValue>),
    Object(std::collections::BTreeMap<String, TestValue>),
}

fn value_strategy() -> impl Strategy<Value = TestValue> {
    let leaf = prop_oneof![
        Just(TestValue::Null),
        any::<bool>().prop_map(TestValue::Bool),
        any::<i64>().prop_map(TestValue::Int),
        prop_oneof![
            prop::num::f64::NORMAL,
            prop::num::f64::SUBNORMAL,
            prop::num::f64::ZERO,
        ]
        .prop_map(TestValue::Float),
        ".*".prop_map(TestValue::Str),
    ];
    leaf.prop_recursive(4, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(TestValue::Array),
            prop::collection::btree_map(".*", inner, 0..6).prop_map(TestValue::Object),
        ]
    })
}

fn build(graph: &mut Graph, value: &TestValue) -> NodeId {
    match value {
        TestValue::Null => graph.insert(Node::Null),
        TestValue::Bool(v) => graph.insert(*v),
        TestValue::Int(v) => graph.insert(*v),
        TestValue::Float(v) => graph.insert(*v),
        TestValue::Str(v) => graph.insert(v.as_str()),
        TestValue::Array(items) => {
            let ids: Vec<NodeId> = items.iter().map(|item| build(graph, item)).collect();
            graph.insert(Node::Array(ids))
        }
        TestValue::Object(members) => {
            let object = graph.insert(Node::object());
            for (name, member) in members {
                let id = build(graph, member);
                graph.set_member(object, name.clone(), id);
            }
            object
        }
    }
}

/// Mapper with date recognition disabled so arbitrary strings survive unchanged
fn plain_mapper() -> mapson::ser::JsonMapper {
    mapper_custom(
        sample_registry(),
        MapperSettings {
            date_parse_handling: DateParseHandling::None,
            ..MapperSettings::new()
        },
    )
}

proptest! {
    /// Any acyclic dynamic graph survives serialize → deserialize
    #[test]
    fn round_trip(value in value_strategy()) {
        let mapper = plain_mapper();
        let mut graph = Graph::new();
        let root = build(&mut graph, &value);

        let json = mapper.to_string(&graph, root).unwrap();
        let mut parsed_graph = Graph::new();
        let parsed = mapper.parse_str(&mut parsed_graph, &json).unwrap();
        prop_assert!(graph.deep_eq(root, &parsed_graph, parsed), "JSON: {json}");
    }

    /// Writing the same value twice yields byte-identical output
    #[test]
    fn formatting_is_idempotent(value in value_strategy()) {
        let mapper = plain_mapper();
        let mut graph = Graph::new();
        let root = build(&mut graph, &value);

        let first = mapper.to_string(&graph, root).unwrap();
        let second = mapper.to_string(&graph, root).unwrap();
        prop_assert_eq!(first, second);
    }

    /// Feeding the reader in 2-character increments produces the identical
    /// token sequence as one full buffer
    #[test]
    fn chunked_reading_is_equivalent(value in value_strategy()) {
        let mapper = plain_mapper();
        let mut graph = Graph::new();
        let root = build(&mut graph, &value);
        let json = mapper.to_string(&graph, root).unwrap();

        let mut full_reader = JsonTextReader::from_str(&json);
        let mut full_tokens = Vec::new();
        while let Some(token) = full_reader.advance().unwrap() {
            full_tokens.push(token);
        }

        struct TwoByteSource<'a> {
            data: &'a [u8],
            pos: usize,
        }
        impl mapson::reader::ByteSource for TwoByteSource<'_> {
            fn read(&mut self, buf: &mut [u8]) -> Result<usize, std::io::Error> {
                let count = 2.min(buf.len()).min(self.data.len() - self.pos);
                buf[..count].copy_from_slice(&self.data[self.pos..self.pos + count]);
                self.pos += count;
                Ok(count)
            }
        }

        let mut chunked_reader = JsonTextReader::new(TwoByteSource { data: json.as_bytes(), pos: 0 });
        let mut chunked_tokens: Vec<Token> = Vec::new();
        while let Some(token) = chunked_reader.advance().unwrap() {
            chunked_tokens.push(token);
        }

        prop_assert_eq!(full_tokens, chunked_tokens);
    }

    /// Malformed documents fail with the identical error regardless of chunking
    #[test]
    fn chunked_errors_are_identical(prefix in "[a-z0-9\\{\\}\\[\\],:\" ]{0,40}") {
        let full = JsonTextReader::new_custom(
            SliceSource::new(prefix.as_bytes()),
            ReaderSettings::default(),
        );
        let one_byte = {
            struct OneByteSource<'a> { data: &'a [u8], pos: usize }
            impl mapson::reader::ByteSource for OneByteSource<'_> {
                fn read(&mut self, buf: &mut [u8]) -> Result<usize, std::io::Error> {
                    let count = 1.min(buf.len()).min(self.data.len() - self.pos);
                    buf[..count].copy_from_slice(&self.data[self.pos..self.pos + count]);
                    self.pos += count;
                    Ok(count)
                }
            }
            JsonTextReader::new(OneByteSource { data: prefix.as_bytes(), pos: 0 })
        };

        fn outcome<S: mapson::reader::ByteSource>(mut reader: JsonTextReader<S>) -> Result<Vec<Token>, String> {
            let mut tokens = Vec::new();
            loop {
                match reader.advance() {
                    Ok(Some(token)) => tokens.push(token),
                    Ok(None) => return Ok(tokens),
                    Err(e) => return Err(e.to_string()),
                }
            }
        }

        prop_assert_eq!(outcome(full), outcome(one_byte));
    }
}
