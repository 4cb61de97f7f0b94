//! User-supplied converters overriding default contract behavior
//!
//! An ordered chain of converters is consulted for a value before the mapper falls
//! back to contract-default behavior. A converter declares which types it applies to
//! and whether it supports reading, writing or both; a write-incapable converter on
//! the write path makes the mapper fall back to default behavior for that write, and
//! vice versa for reads.

use std::sync::Arc;

use crate::graph::{Graph, NodeId};
use crate::ser::{DeserializeContext, SerError, SerializeContext};

/// A converter replacing the default mapping of a type
///
/// Converters may re-enter the mapper through the provided context (for nested
/// values), which shares the depth budget and reference table of the outer call.
pub trait Converter: Send + Sync {
    /// Whether this converter applies to the type
    fn handles(&self, type_tag: &str) -> bool;

    /// Whether this converter supports the write path
    fn can_write(&self) -> bool {
        true
    }

    /// Whether this converter supports the read path
    fn can_read(&self) -> bool {
        true
    }

    /// Writes the node
    ///
    /// The default implementation fails; converters declaring
    /// [`can_write`](Self::can_write) must override it.
    fn write(
        &self,
        _graph: &Graph,
        _node: NodeId,
        ctx: &mut SerializeContext<'_, '_>,
    ) -> Result<(), SerError> {
        Err(SerError::ConversionFailed {
            message: "Converter does not support writing.".to_owned(),
            path: ctx.path(),
        })
    }

    /// Reads the next value and returns the constructed node
    ///
    /// The default implementation fails; converters declaring
    /// [`can_read`](Self::can_read) must override it.
    fn read(
        &self,
        _graph: &mut Graph,
        ctx: &mut DeserializeContext<'_, '_>,
    ) -> Result<NodeId, SerError> {
        Err(SerError::ConversionFailed {
            message: "Converter does not support reading.".to_owned(),
            path: ctx.path(),
        })
    }
}

/// Finds the first converter in the chain which applies to the type and supports
/// the requested direction
pub(crate) fn find_converter<'a>(
    chain: &'a [Arc<dyn Converter>],
    type_tag: &str,
    write: bool,
) -> Option<&'a Arc<dyn Converter>> {
    chain.iter().find(|c| {
        c.handles(type_tag)
            && if write {
                c.can_write()
            } else {
                c.can_read()
            }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct WriteOnly;
    impl Converter for WriteOnly {
        fn handles(&self, type_tag: &str) -> bool {
            type_tag == "special"
        }
        fn can_read(&self) -> bool {
            false
        }
        fn write(
            &self,
            _graph: &Graph,
            _node: NodeId,
            _ctx: &mut SerializeContext<'_, '_>,
        ) -> Result<(), SerError> {
            Ok(())
        }
    }

    #[test]
    fn chain_respects_direction() {
        let chain: Vec<Arc<dyn Converter>> = vec![Arc::new(WriteOnly)];
        assert!(find_converter(&chain, "special", true).is_some());
        // Falls back to default behavior for reads
        assert!(find_converter(&chain, "special", false).is_none());
        assert!(find_converter(&chain, "other", true).is_none());
    }

    #[test]
    fn chain_order_wins() {
        struct Tagged(&'static str);
        impl Converter for Tagged {
            fn handles(&self, type_tag: &str) -> bool {
                type_tag == "t"
            }
            fn write(
                &self,
                _graph: &Graph,
                _node: NodeId,
                _ctx: &mut SerializeContext<'_, '_>,
            ) -> Result<(), SerError> {
                Ok(())
            }
        }
        let chain: Vec<Arc<dyn Converter>> = vec![Arc::new(Tagged("first")), Arc::new(Tagged("second"))];
        let found = find_converter(&chain, "t", true).unwrap();
        // The first matching converter is used
        assert!(Arc::ptr_eq(found, &chain[0]));
    }
}
