//! Advanced-search query builder engine.
//!
//! A [`QueryTree`](ast::QueryTree) of search-term leaves nested in AND/OR groups, the mutations
//! that edit it, a drag-and-drop adapter on top of those mutations, and a serializer that
//! flattens the tree into the search backend's boolean query string. The parser and the
//! validator go the other way, from a hand-edited query string back to a tree.

pub mod ast;
pub mod config;
pub mod drag_drop;
pub mod fields;
pub mod histogram;
pub mod lexer;
pub mod mutation;
pub mod parser;
pub mod serializer;
pub mod session;
pub mod storage;
pub mod token;
pub mod validation;

pub use ast::{Group, GroupKind, Leaf, LeafValue, Node, NodeId, Operator, QueryTree, Term};
pub use mutation::{TreeError, TreeResult};
pub use parser::{parse_query, ParseError};
pub use serializer::serialize;
pub use session::BuilderSession;
