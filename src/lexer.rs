use crate::error::{Error, LexErrorKind, Result};
use crate::token::{Kind, Token};

/// Turns source text into tokens on demand.
///
/// Once the end of input is reached, [`Lexer::next_token`] keeps returning
/// [`Kind::Eof`]. The stream can be replayed from the start with [`Lexer::reset`].
pub struct Lexer<'a> {
    source: &'a str,
    cursor: usize,
    line: usize,
    finished: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Lexer {
            source,
            cursor: 0,
            line: 1,
            finished: false,
        }
    }

    /// Rewind to the first token.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.line = 1;
        self.finished = false;
    }

    /// Get the next token. This consumes the token.
    pub fn next_token(&mut self) -> Result<Token<'a>> {
        self.trim()?;

        let start = self.cursor;
        let line = self.line;
        let ch = match self.next_char(false) {
            Some(ch) => ch,
            None => return Ok(Token::new(Kind::Eof, "", line)),
        };

        let kind = match ch {
            ch if ch.is_alphabetic() => return Ok(self.read_word(start)),
            ch if ch.is_ascii_digit() => return Ok(self.read_number(start)),
            '+' => Kind::Plus,
            '-' => Kind::Minus,
            '*' => Kind::Star,
            '/' => Kind::Slash,
            '.' => Kind::Dot,
            ',' => Kind::Comma,
            ';' => Kind::Semicolon,
            '(' => Kind::LeftParen,
            ')' => Kind::RightParen,
            '$' => Kind::Dollar,
            '=' => Kind::Equal,
            ':' => self.pick('=', Kind::Assign, Kind::Colon),
            '>' => self.pick('=', Kind::GreaterEqual, Kind::Greater),
            '<' => {
                if self.eat('=') {
                    Kind::LessEqual
                } else if self.eat('>') {
                    Kind::NotEqual
                } else {
                    Kind::Less
                }
            }
            ch => {
                return Err(Error::Lexical {
                    line,
                    kind: LexErrorKind::UnexpectedChar(ch),
                })
            }
        };

        Ok(Token::new(kind, &self.source[start..self.cursor], line))
    }

    /// Skip whitespace, `{ ... }` comments and `/* ... */` comments
    fn trim(&mut self) -> Result<()> {
        while let Some(ch) = self.next_char(true) {
            match ch {
                ' ' | '\t' | '\r' | '\x0C' | '\n' => {
                    let _ = self.next_char(false);
                }
                '{' => {
                    let opened = self.line;
                    let _ = self.next_char(false);
                    loop {
                        match self.next_char(false) {
                            Some('}') => break,
                            Some(_) => {}
                            None => return Err(unterminated(opened)),
                        }
                    }
                }
                '/' if self.peek_second() == Some('*') => {
                    let opened = self.line;
                    self.cursor += 2;
                    loop {
                        match self.next_char(false) {
                            Some('*') => {
                                if self.eat('/') {
                                    break;
                                }
                            }
                            Some(_) => {}
                            None => return Err(unterminated(opened)),
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    /// Read an identifier or a keyword
    fn read_word(&mut self, start: usize) -> Token<'a> {
        while let Some(ch) = self.next_char(true) {
            if !ch.is_alphanumeric() && ch != '_' {
                break;
            }
            let _ = self.next_char(false);
        }

        let word = &self.source[start..self.cursor];
        let kind = Kind::keyword(word).unwrap_or(Kind::Ident);
        Token::new(kind, word, self.line)
    }

    /// Read an integer, or a real when a '.' is followed by at least one digit
    fn read_number(&mut self, start: usize) -> Token<'a> {
        self.skip_digits();

        let mut kind = Kind::IntLiteral;
        if self.next_char(true) == Some('.')
            && self.peek_second().map_or(false, |ch| ch.is_ascii_digit())
        {
            let _ = self.next_char(false);
            self.skip_digits();
            kind = Kind::RealLiteral;
        }

        Token::new(kind, &self.source[start..self.cursor], self.line)
    }

    fn skip_digits(&mut self) {
        while self.next_char(true).map_or(false, |ch| ch.is_ascii_digit()) {
            let _ = self.next_char(false);
        }
    }

    /// Consume `expected` if it is the next char
    fn eat(&mut self, expected: char) -> bool {
        if self.next_char(true) == Some(expected) {
            let _ = self.next_char(false);
            true
        } else {
            false
        }
    }

    fn pick(&mut self, follow: char, long: Kind, short: Kind) -> Kind {
        if self.eat(follow) {
            long
        } else {
            short
        }
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.source[self.cursor..].chars();
        chars.next();
        chars.next()
    }

    /// Get the next char and advance the cursor if `peek` is false
    fn next_char(&mut self, peek: bool) -> Option<char> {
        let ch = self.source[self.cursor..].chars().next()?;
        if !peek {
            self.cursor += ch.len_utf8();
            if ch == '\n' {
                self.line += 1;
            }
        }
        Some(ch)
    }
}

fn unterminated(line: usize) -> Error {
    Error::Lexical {
        line,
        kind: LexErrorKind::UnterminatedComment,
    }
}

/// Yields every token up to, but not including, `Eof`. Stops after the first error.
impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_token() {
            Ok(token) if token.kind == Kind::Eof => {
                self.finished = true;
                None
            }
            Ok(token) => Some(Ok(token)),
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(program: &str) -> Vec<Kind> {
        Lexer::new(program).map(|t| t.unwrap().kind).collect()
    }

    #[test]
    fn trim() {
        let program = "\t\r\x0C {note}\n /* a\nb */ begin";
        let mut lexer = Lexer::new(program);
        lexer.trim().unwrap();
        assert_eq!(&lexer.source[lexer.cursor..], "begin");
        assert_eq!(lexer.line, 3);
    }

    #[test]
    fn read_number() {
        let mut lexer = Lexer::new("123 4.75 9. 3.x");
        let expected = [
            (Kind::IntLiteral, "123"),
            (Kind::RealLiteral, "4.75"),
            (Kind::IntLiteral, "9"),
            (Kind::Dot, "."),
            (Kind::IntLiteral, "3"),
            (Kind::Dot, "."),
            (Kind::Ident, "x"),
        ];
        for (kind, lexeme) in expected {
            let token = lexer.next_token().unwrap();
            assert_eq!((token.kind, token.lexeme), (kind, lexeme));
        }
    }

    #[test]
    fn keywords_before_identifiers() {
        let mut lexer = Lexer::new("Begin begin_1 WHILE x9");
        let token = lexer.next_token().unwrap();
        assert_eq!((token.kind, token.lexeme), (Kind::Begin, "Begin"));
        let token = lexer.next_token().unwrap();
        assert_eq!((token.kind, token.lexeme), (Kind::Ident, "begin_1"));
        assert_eq!(lexer.next_token().unwrap().kind, Kind::While);
        assert_eq!(lexer.next_token().unwrap().kind, Kind::Ident);
    }

    #[test]
    fn operators() {
        assert_eq!(
            kinds(":= : <= <> < >= > = + - * / ( ) , ; $ ."),
            vec![
                Kind::Assign,
                Kind::Colon,
                Kind::LessEqual,
                Kind::NotEqual,
                Kind::Less,
                Kind::GreaterEqual,
                Kind::Greater,
                Kind::Equal,
                Kind::Plus,
                Kind::Minus,
                Kind::Star,
                Kind::Slash,
                Kind::LeftParen,
                Kind::RightParen,
                Kind::Comma,
                Kind::Semicolon,
                Kind::Dollar,
                Kind::Dot,
            ]
        );
    }

    #[test]
    fn eof_is_sticky() {
        let mut lexer = Lexer::new("x");
        assert_eq!(lexer.next_token().unwrap().kind, Kind::Ident);
        for _ in 0..3 {
            assert_eq!(lexer.next_token().unwrap().kind, Kind::Eof);
        }
    }

    #[test]
    fn reset_replays() {
        let mut lexer = Lexer::new("program p;");
        let first: Vec<_> = lexer.by_ref().map(|t| t.unwrap()).collect();
        assert!(lexer.next().is_none());
        lexer.reset();
        let second: Vec<_> = lexer.map(|t| t.unwrap()).collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn lines_are_tracked() {
        let mut lexer = Lexer::new("a\n{ x\n y }\nb");
        assert_eq!(lexer.next_token().unwrap().line, 1);
        assert_eq!(lexer.next_token().unwrap().line, 4);
    }

    #[test]
    fn unexpected_char() {
        let mut lexer = Lexer::new("x\n  #");
        lexer.next_token().unwrap();
        match lexer.next_token() {
            Err(Error::Lexical { line, kind }) => {
                assert_eq!(line, 2);
                assert_eq!(kind, LexErrorKind::UnexpectedChar('#'));
            }
            other => panic!("expected a lexical error, got {:?}", other),
        }
    }

    #[test]
    fn unterminated_comment() {
        let mut lexer = Lexer::new("x\n/* never\nclosed");
        lexer.next_token().unwrap();
        assert!(matches!(
            lexer.next_token(),
            Err(Error::Lexical {
                line: 2,
                kind: LexErrorKind::UnterminatedComment
            })
        ));
    }

    #[test]
    fn iterator_stops_after_error() {
        let mut lexer = Lexer::new("a ? b");
        assert!(lexer.next().unwrap().is_ok());
        assert!(lexer.next().unwrap().is_err());
        assert!(lexer.next().is_none());
    }
}
