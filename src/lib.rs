#![warn(missing_docs)]
#![forbid(unsafe_code)]
// Allow needless `return` because that makes it sometimes more obvious that
// an expression is the result of the function
#![allow(clippy::needless_return)]
// Allow `assert_eq!(true, ...)` because in some cases it is used to check a bool
// value and not a 'flag' / 'state', and `assert_eq!` makes that more explicit
#![allow(clippy::bool_assert_comparison)]
// Enable 'unused' warnings for doc tests (are disabled by default)
#![doc(test(no_crate_inject))]
#![doc(test(attr(warn(unused))))]
// Fail on warnings in doc tests
#![doc(test(attr(deny(warnings))))]
// When `docsrs` configuration flag is set enable banner for features in documentation
// See https://stackoverflow.com/q/61417452
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Mapson is a streaming JSON reader and writer with a graph-based object mapper
//! layered on top.
//!
//! The lower layer is a pair of explicit state machines: [`reader::JsonTextReader`]
//! tokenizes JSON text with exact position bookkeeping, and [`writer::JsonTextWriter`]
//! turns typed token calls back into correctly nested, correctly formatted JSON text.
//! The upper layer, [`ser::JsonMapper`], converts between an in-memory object graph
//! ([`graph::Graph`]) and the token stream: it resolves per-type
//! [contracts](contract::Contract), preserves object identity and cycles with an
//! `$id`/`$ref` scheme, supports polymorphic round-tripping with `$type` markers and
//! dispatches to user-supplied [converters](convert::Converter).
//!
//! # Usage examples
//!
//! ## Reading
//!
//! ```
//! use mapson::reader::{JsonTextReader, TokenRead};
//! use mapson::token::Token;
//!
//! // In this example JSON data comes from a string;
//! // normally it would come from a file or a network connection
//! let mut json_reader = JsonTextReader::from_str(r#"{"a": [1, true]}"#);
//!
//! assert_eq!(Some(Token::BeginObject), json_reader.advance()?);
//! assert_eq!(Some(Token::Name("a".to_owned())), json_reader.advance()?);
//! assert_eq!(Some(Token::BeginArray), json_reader.advance()?);
//! assert_eq!(Some(Token::Int(1)), json_reader.advance()?);
//! assert_eq!(Some(Token::Bool(true)), json_reader.advance()?);
//! assert_eq!(Some(Token::EndArray), json_reader.advance()?);
//! assert_eq!(Some(Token::EndObject), json_reader.advance()?);
//! // Ensures that there is no trailing data
//! assert_eq!(None, json_reader.advance()?);
//! # Ok::<(), mapson::reader::ReaderError>(())
//! ```
//!
//! ## Writing
//!
//! ```
//! use mapson::writer::JsonTextWriter;
//!
//! // In this example JSON bytes are stored in a Vec;
//! // normally they would be written to a file or network connection
//! let mut json_writer = JsonTextWriter::new(Vec::new());
//!
//! json_writer.begin_object()?;
//! json_writer.name("a")?;
//! json_writer.begin_array()?;
//! json_writer.int_value(1)?;
//! json_writer.bool_value(true)?;
//! json_writer.end_array()?;
//! json_writer.end_object()?;
//!
//! // Completes the document and flushes the buffer
//! let bytes = json_writer.close()?.unwrap();
//! assert_eq!(r#"{"a":[1,true]}"#, String::from_utf8(bytes)?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Mapping
//!
//! ```
//! use std::sync::Arc;
//! use mapson::contract::{DefaultContractResolver, MemberSpec, TypeDescriptor, TypeRegistry};
//! use mapson::graph::{Graph, Node};
//! use mapson::ser::JsonMapper;
//!
//! let mut registry = TypeRegistry::new();
//! registry.register(TypeDescriptor::object(
//!     "point",
//!     vec![MemberSpec::new("x").required(), MemberSpec::new("y").required()],
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
//! assert_eq!(r#"{"x":1,"y":2}"#, mapper.to_string(&graph, point)?);
//! # Ok::<(), mapson::ser::SerError>(())
//! ```

pub mod binder;
pub mod contract;
pub mod convert;
pub mod graph;
pub mod reader;
pub mod ser;
pub mod token;
pub mod writer;

mod json_number;
mod utf8;
