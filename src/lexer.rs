//! 查询字符串的词法分析器

use crate::token::{Span, Token, TokenKind};

/// 不能出现在未加引号的单词中的字符
const DELIMITERS: &[char] = &['(', ')', '[', ']', '{', '}', ':', '"'];

pub struct Lexer<'a> {
    input: &'a str,
    /// 输入字符串中的当前位置（字节索引）
    position: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer { input, position: 0 }
    }

    /// 返回当前位置的字符，不推进位置
    fn peek(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    /// 推进位置一个字符并返回该字符
    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if let Some(c) = c {
            self.position += c.len_utf8();
        }
        c
    }

    /// 跳过空白字符
    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    /// 读取双引号包围的短语
    /// 注意：开始的引号已经被调用者消费；反斜杠转义的引号不会结束短语
    fn read_string(&mut self, start: usize) -> Token<'a> {
        let content_start = self.position;
        let mut escaped = false;
        loop {
            match self.peek() {
                None => {
                    // 缺少结束引号
                    return Token {
                        kind: TokenKind::Illegal,
                        span: Span::new(start, self.position),
                    };
                }
                Some('"') if !escaped => break,
                Some(c) => {
                    escaped = c == '\\' && !escaped;
                    self.bump();
                }
            }
        }
        let content_end = self.position;
        self.bump(); // 消费结束引号

        Token {
            kind: TokenKind::String(&self.input[content_start..content_end]),
            span: Span::new(start, self.position),
        }
    }

    /// 读取单词或关键字
    /// 单词一直延续到空白或分隔符；反斜杠会连同下一个字符一起保留
    fn read_word(&mut self, start: usize) -> Token<'a> {
        while let Some(c) = self.peek() {
            if c == '\\' {
                self.bump();
                self.bump();
            } else if c.is_whitespace() || DELIMITERS.contains(&c) {
                break;
            } else {
                self.bump();
            }
        }
        let literal = &self.input[start..self.position];
        Token {
            kind: match_keyword(literal),
            span: Span::new(start, self.position),
        }
    }
}

fn match_keyword(s: &str) -> TokenKind {
    match s {
        "AND" | "&&" => TokenKind::And,
        "OR" | "||" => TokenKind::Or,
        "NOT" => TokenKind::Not,
        "TO" => TokenKind::To,
        _ => TokenKind::Word(s),
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.skip_whitespace();
        let start = self.position;

        let Some(c) = self.bump() else {
            return None; // 到达输入末尾
        };

        let kind = match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            ':' => TokenKind::Colon,
            '"' => return Some(self.read_string(start)),
            '\\' => {
                // 转义字符开头的单词
                self.bump();
                return Some(self.read_word(start));
            }
            _ => return Some(self.read_word(start)),
        };
        Some(Token {
            kind,
            span: Span::new(start, self.position),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_term() {
        let input = r#"name:"asthma""#;
        let mut lexer = Lexer::new(input);

        assert_eq!(lexer.next().unwrap().kind, TokenKind::Word("name"));
        assert_eq!(lexer.next().unwrap().kind, TokenKind::Colon);
        assert_eq!(lexer.next().unwrap().kind, TokenKind::String("asthma"));
        assert_eq!(lexer.next(), None);
    }

    #[test]
    fn test_all_punctuation() {
        let input = "( ) [ ] { } :";
        let kinds: Vec<_> = Lexer::new(input).map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::LParen, TokenKind::RParen, TokenKind::LBracket,
                TokenKind::RBracket, TokenKind::LBrace, TokenKind::RBrace,
                TokenKind::Colon,
            ]
        );
    }

    #[test]
    fn test_keywords_are_case_sensitive() {
        let input = "AND OR NOT TO and or && ||";
        let kinds: Vec<_> = Lexer::new(input).map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::And, TokenKind::Or, TokenKind::Not, TokenKind::To,
                TokenKind::Word("and"), TokenKind::Word("or"),
                TokenKind::And, TokenKind::Or,
            ]
        );
    }

    #[test]
    fn test_complex_query() {
        let input = r#"(date:[2019 TO *] OR -_exists_:date) AND name:(*immune* dis*)"#;
        let kinds: Vec<_> = Lexer::new(input).map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::LParen,
                TokenKind::Word("date"),
                TokenKind::Colon,
                TokenKind::LBracket,
                TokenKind::Word("2019"),
                TokenKind::To,
                TokenKind::Word("*"),
                TokenKind::RBracket,
                TokenKind::Or,
                TokenKind::Word("-_exists_"),
                TokenKind::Colon,
                TokenKind::Word("date"),
                TokenKind::RParen,
                TokenKind::And,
                TokenKind::Word("name"),
                TokenKind::Colon,
                TokenKind::LParen,
                TokenKind::Word("*immune*"),
                TokenKind::Word("dis*"),
                TokenKind::RParen,
            ]
        );
    }

    #[test]
    fn test_escapes_stay_in_word() {
        let input = r#"covid\-19 a\:b "say \"hi\"""#;
        let kinds: Vec<_> = Lexer::new(input).map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Word(r"covid\-19"),
                TokenKind::Word(r"a\:b"),
                TokenKind::String(r#"say \"hi\""#),
            ]
        );
    }

    #[test]
    fn test_unterminated_string_is_illegal() {
        let tokens: Vec<_> = Lexer::new(r#"name:"asthma"#).collect();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[2].kind, TokenKind::Illegal);
        assert_eq!(tokens[2].span, Span::new(5, 12));
    }

    #[test]
    fn test_spans() {
        let tokens: Vec<_> = Lexer::new("a:b").collect();
        assert_eq!(tokens[0].span, Span::new(0, 1));
        assert_eq!(tokens[1].span, Span::new(1, 2));
        assert_eq!(tokens[2].span, Span::new(2, 3));
    }
}
