//! 查询字符串的语法分析器，把后端查询字符串还原为查询树
//!
//! ## 解析流程图
//!
//! ```text
//! parse()
//!   └─ parse_or_expression()
//!        ├─ parse_and_expression()
//!        │    ├─ parse_primary_expression()
//!        │    │    ├─ "(" → 分组表达式 (递归调用parse_or_expression)
//!        │    │    ├─ NOT → 不支持, 报错
//!        │    │    └─ 其他 → parse_leaf()
//!        │    │              ├─ 字段 ":" → parse_field_value()
//!        │    │              │    ├─ "_exists_" / "-_exists_" → 存在性检查
//!        │    │              │    ├─ "[" a TO b "]" → 范围
//!        │    │              │    ├─ "(" 单词... ")" → 多词值
//!        │    │              │    └─ 短语 / 单词
//!        │    │              ├─ 短语 → 精确匹配
//!        │    │              └─ 连续单词 → 合并为一个自由文本
//!        │    │
//!        │    └─ 遇到AND时，继续解析右侧表达式
//!        │
//!        └─ 遇到OR时，继续解析右侧AND表达式
//! ```
//!
//! ## 语法优先级（从高到低）
//!
//! 1. **括号分组** `(expression)`
//! 2. **叶子条件** `field:value`, `field:[a TO b]`, `_exists_:field`
//! 3. **AND操作** `expr1 AND expr2`
//! 4. **OR操作** `expr1 OR expr2`
//!
//! 同一层级中连续的同类运算合并为一个组：`a AND b AND c` 得到一个包含三个子节点的AND组，
//! 而 `(a AND b) AND c` 保留用户写下的嵌套。
//!
//! ## 解析示例
//!
//! ```text
//! name:"asthma" AND name:"covid"
//! (date:[2019 TO *] OR -_exists_:date) AND malaria
//! name:(*immune* *dis*)
//! ```

use crate::ast::{Group, GroupKind, Leaf, LeafValue, Node, NodeId, Operator, QueryTree, Term};
use crate::lexer::Lexer;
use crate::mutation::TreeError;
use crate::serializer::{unescape_phrase, EXISTS_FIELD, NOT_EXISTS_FIELD};
use crate::token::{Span, Token, TokenKind};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unexpected {found} at {}..{}", .span.start, .span.end)]
    Unexpected { found: String, span: Span },

    #[error("unexpected end of input, expected {expected}")]
    UnexpectedEnd { expected: &'static str },

    #[error("missing AND/OR before position {}", .span.start)]
    MissingUnion { span: Span },

    #[error("NOT at position {} is not supported, use -_exists_ for missing values", .span.start)]
    UnsupportedNot { span: Span },

    #[error("unterminated phrase starting at position {}", .span.start)]
    UnterminatedPhrase { span: Span },

    #[error(transparent)]
    Tree(#[from] TreeError),
}

impl ParseError {
    pub fn span(&self) -> Option<Span> {
        match self {
            ParseError::Unexpected { span, .. }
            | ParseError::MissingUnion { span }
            | ParseError::UnsupportedNot { span }
            | ParseError::UnterminatedPhrase { span } => Some(*span),
            ParseError::UnexpectedEnd { .. } | ParseError::Tree(_) => None,
        }
    }

    fn unexpected(token: &Token) -> Self {
        match token.kind {
            TokenKind::Illegal => ParseError::UnterminatedPhrase { span: token.span },
            TokenKind::Not => ParseError::UnsupportedNot { span: token.span },
            _ => ParseError::Unexpected {
                found: format!("{:?}", token.kind),
                span: token.span,
            },
        }
    }
}

/// Lexes and parses a query string in one go.
pub fn parse_query(input: &str) -> Result<QueryTree, ParseError> {
    let tokens: Vec<_> = Lexer::new(input).collect();
    Parser::new(&tokens).parse()
}

pub struct Parser<'a> {
    tokens: &'a [Token<'a>],
    position: usize,
    id_prefix: String,
    next_id: u64,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token<'a>]) -> Self {
        Self {
            tokens,
            position: 0,
            id_prefix: "node-".to_string(),
            next_id: 1,
        }
    }

    /// 设置新节点id的前缀
    pub fn with_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.id_prefix = prefix.into();
        self
    }

    /// 返回当前 token，不推进位置
    fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.position)
    }

    /// 返回下一个 token，不推进位置
    fn peek_next(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.position + 1)
    }

    /// 返回当前 token 并推进位置
    fn advance(&mut self) -> Option<&'a Token<'a>> {
        let tokens = self.tokens;
        let token = tokens.get(self.position)?;
        self.position += 1;
        Some(token)
    }

    /// 期望特定类型的 token 并推进，否则返回错误
    fn expect(&mut self, expected: TokenKind, name: &'static str) -> Result<&'a Token<'a>, ParseError> {
        let tokens = self.tokens;
        match tokens.get(self.position) {
            Some(token) if std::mem::discriminant(&token.kind) == std::mem::discriminant(&expected) => {
                self.position += 1;
                Ok(token)
            }
            Some(token) => Err(ParseError::unexpected(token)),
            None => Err(ParseError::UnexpectedEnd { expected: name }),
        }
    }

    /// 期望一个单词并返回其文本
    fn expect_word(&mut self, name: &'static str) -> Result<&'a str, ParseError> {
        let tokens = self.tokens;
        match tokens.get(self.position) {
            Some(Token { kind: TokenKind::Word(word), .. }) => {
                self.position += 1;
                Ok(*word)
            }
            Some(token) => Err(ParseError::unexpected(token)),
            None => Err(ParseError::UnexpectedEnd { expected: name }),
        }
    }

    /// 检查当前 token 是否匹配给定类型
    fn match_token(&self, kind: &TokenKind) -> bool {
        if let Some(token) = self.peek() {
            std::mem::discriminant(&token.kind) == std::mem::discriminant(kind)
        } else {
            false
        }
    }

    fn fresh_id(&mut self) -> NodeId {
        let id = NodeId::new(format!("{}{}", self.id_prefix, self.next_id));
        self.next_id += 1;
        id
    }

    pub fn parse(&mut self) -> Result<QueryTree, ParseError> {
        if self.tokens.is_empty() {
            return Ok(QueryTree::default().with_id_prefix(self.id_prefix.clone()));
        }

        let node = self.parse_or_expression()?;
        if let Some(token) = self.peek() {
            return Err(ParseError::unexpected(token));
        }

        let root = match node {
            Node::Group(group) => Group::with_children(NodeId::root(), group.kind, group.children),
            leaf @ Node::Leaf(_) => Group::with_children(NodeId::root(), GroupKind::And, vec![leaf]),
        };
        let tree = QueryTree::from_root(root)?;
        Ok(tree.with_id_prefix(self.id_prefix.clone()))
    }

    /// or_expr := and_expr (OR and_expr)*
    fn parse_or_expression(&mut self) -> Result<Node, ParseError> {
        let first = self.parse_and_expression()?;
        if !self.match_token(&TokenKind::Or) {
            return Ok(first);
        }
        let mut children = vec![first];
        while self.match_token(&TokenKind::Or) {
            self.advance(); // 消费 OR
            children.push(self.parse_and_expression()?);
        }
        let id = self.fresh_id();
        Ok(Node::Group(Group::with_children(id, GroupKind::Or, children)))
    }

    /// and_expr := primary (AND primary)*
    fn parse_and_expression(&mut self) -> Result<Node, ParseError> {
        let first = self.parse_primary_expression()?;
        self.check_union()?;
        if !self.match_token(&TokenKind::And) {
            return Ok(first);
        }
        let mut children = vec![first];
        while self.match_token(&TokenKind::And) {
            self.advance(); // 消费 AND
            children.push(self.parse_primary_expression()?);
            self.check_union()?;
        }
        let id = self.fresh_id();
        Ok(Node::Group(Group::with_children(id, GroupKind::And, children)))
    }

    /// 两个条件之间必须有AND或OR
    fn check_union(&self) -> Result<(), ParseError> {
        match self.peek() {
            Some(token)
                if matches!(
                    token.kind,
                    TokenKind::Word(_) | TokenKind::String(_) | TokenKind::LParen | TokenKind::LBracket
                ) =>
            {
                Err(ParseError::MissingUnion { span: token.span })
            }
            _ => Ok(()),
        }
    }

    fn parse_primary_expression(&mut self) -> Result<Node, ParseError> {
        let Some(token) = self.peek() else {
            return Err(ParseError::UnexpectedEnd { expected: "a search term" });
        };
        match token.kind {
            TokenKind::LParen => {
                self.advance(); // 消费 '('
                let inner = self.parse_or_expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            _ => self.parse_leaf(),
        }
    }

    fn parse_leaf(&mut self) -> Result<Node, ParseError> {
        let Some(token) = self.peek().cloned() else {
            return Err(ParseError::UnexpectedEnd { expected: "a search term" });
        };

        match token.kind {
            TokenKind::Word(field) if self.peek_next().map(|t| &t.kind) == Some(&TokenKind::Colon) => {
                self.advance(); // 消费字段名
                self.advance(); // 消费 ':'
                self.parse_field_value(field)
            }
            TokenKind::Word(_) => {
                // 连续的单词合并为一个自由文本条件
                let mut words = Vec::new();
                while let Some(Token { kind: TokenKind::Word(word), .. }) = self.peek() {
                    if self.peek_next().map(|t| &t.kind) == Some(&TokenKind::Colon) {
                        break;
                    }
                    words.push(*word);
                    self.advance();
                }
                let id = self.fresh_id();
                Ok(Node::Leaf(Leaf::raw(id, None, words.join(" "))))
            }
            TokenKind::String(phrase) => {
                self.advance();
                Ok(Node::Leaf(self.phrase_leaf(None, phrase)))
            }
            TokenKind::LBracket | TokenKind::LBrace => {
                let (start, end) = self.parse_range()?;
                let id = self.fresh_id();
                Ok(Node::Leaf(Leaf::new(
                    id,
                    Term {
                        field: None,
                        operator: Some(Operator::Range),
                        value: LeafValue::Range { start, end },
                    },
                )))
            }
            _ => Err(ParseError::unexpected(&token)),
        }
    }

    fn parse_field_value(&mut self, field: &str) -> Result<Node, ParseError> {
        if field == EXISTS_FIELD || field == NOT_EXISTS_FIELD {
            let target = self.expect_word("a field name")?;
            let term = if field == EXISTS_FIELD {
                Term::exists(target)
            } else {
                Term::not_exists(target)
            };
            let id = self.fresh_id();
            return Ok(Node::Leaf(Leaf::new(id, term)));
        }

        let Some(token) = self.peek().cloned() else {
            return Err(ParseError::UnexpectedEnd { expected: "a value" });
        };
        match token.kind {
            TokenKind::String(phrase) => {
                self.advance();
                Ok(Node::Leaf(self.phrase_leaf(Some(field), phrase)))
            }
            TokenKind::LBracket | TokenKind::LBrace => {
                let (start, end) = self.parse_range()?;
                let id = self.fresh_id();
                let term = Term {
                    field: Some(field.to_string()),
                    operator: Some(Operator::Range),
                    value: LeafValue::Range { start, end },
                };
                Ok(Node::Leaf(Leaf::new(id, term)))
            }
            TokenKind::LParen => {
                self.advance(); // 消费 '('
                let mut parts = Vec::new();
                loop {
                    let Some(token) = self.advance() else {
                        return Err(ParseError::UnexpectedEnd { expected: "')'" });
                    };
                    match &token.kind {
                        TokenKind::RParen => break,
                        TokenKind::Word(word) => parts.push(word.to_string()),
                        TokenKind::String(phrase) => parts.push(format!("\"{}\"", phrase)),
                        TokenKind::And => parts.push("AND".to_string()),
                        TokenKind::Or => parts.push("OR".to_string()),
                        _ => return Err(ParseError::unexpected(token)),
                    }
                }
                let id = self.fresh_id();
                Ok(Node::Leaf(Leaf::raw(id, Some(field.to_string()), parts.join(" "))))
            }
            TokenKind::Word(word) => {
                self.advance();
                let id = self.fresh_id();
                Ok(Node::Leaf(Leaf::raw(id, Some(field.to_string()), word)))
            }
            _ => Err(ParseError::unexpected(&token)),
        }
    }

    /// "[" start TO end "]"，"*" 表示开放边界
    fn parse_range(&mut self) -> Result<(Option<String>, Option<String>), ParseError> {
        self.advance(); // 消费 '[' 或 '{'
        let start = self.range_bound()?;
        self.expect(TokenKind::To, "TO")?;
        let end = self.range_bound()?;
        match self.advance() {
            Some(Token { kind: TokenKind::RBracket | TokenKind::RBrace, .. }) => Ok((start, end)),
            Some(token) => Err(ParseError::unexpected(token)),
            None => Err(ParseError::UnexpectedEnd { expected: "']'" }),
        }
    }

    /// A bare word, `*` for an open bound, or a quoted phrase for bounds with spaces or keywords.
    fn range_bound(&mut self) -> Result<Option<String>, ParseError> {
        match self.advance() {
            Some(Token { kind: TokenKind::Word(word), .. }) => {
                Ok((*word != "*").then(|| word.to_string()))
            }
            Some(Token { kind: TokenKind::String(phrase), .. }) => Ok(Some(unescape_phrase(phrase))),
            Some(token) => Err(ParseError::unexpected(token)),
            None => Err(ParseError::UnexpectedEnd { expected: "a range bound" }),
        }
    }

    fn phrase_leaf(&mut self, field: Option<&str>, phrase: &str) -> Leaf {
        let id = self.fresh_id();
        Leaf {
            id,
            field: field.map(str::to_string),
            operator: Some(Operator::Exact),
            value: LeafValue::Text(unescape_phrase(phrase)),
            querystring: format!("\"{}\"", phrase),
        }
    }
}
