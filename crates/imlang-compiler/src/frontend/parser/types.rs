//! # 型の解析
//!
//! 基本型名・名前付き型・`record ... end`・`array[size] T` を解析します。

use crate::frontend::ast::{PrimitiveName, TypeRef, TypeRefKind};
use crate::frontend::lexer::{TokenKind, TokenSource};
use crate::frontend::source::Span;

use super::Parser;

impl<S: TokenSource> Parser<S> {
    pub(super) fn parse_type(&mut self) -> TypeRef {
        let start = self.current.span;

        match self.current.kind {
            TokenKind::Identifier => {
                let token = self.next();
                let name = token.text.unwrap_or_default();
                let kind = match PrimitiveName::from_name(&name) {
                    Some(primitive) => TypeRefKind::Primitive(primitive),
                    None => TypeRefKind::Named(name),
                };
                TypeRef { span: token.span, kind }
            }
            TokenKind::Record => {
                self.next();
                let mut fields = Vec::new();
                self.skip_separators();
                while self.check(TokenKind::Var) {
                    fields.push(self.parse_var_decl());
                    self.skip_separators();
                }
                self.expect(TokenKind::End, "expected 'end' to close record");
                TypeRef { span: self.span_from(start), kind: TypeRefKind::Record { fields } }
            }
            TokenKind::Array => {
                self.next();
                let mut size = None;
                if self.accept(TokenKind::LBracket) {
                    if !self.check(TokenKind::RBracket) {
                        size = Some(Box::new(self.parse_expression()));
                    }
                    self.expect(TokenKind::RBracket, "expected ']'");
                }
                let element = Box::new(self.parse_type());
                TypeRef { span: self.span_from(start), kind: TypeRefKind::Array { element, size } }
            }
            _ => {
                self.error_at_current("type expected");
                let span = Span::new(start.start, 0, start.line, start.column);
                TypeRef { span, kind: TypeRefKind::Named("<error>".to_string()) }
            }
        }
    }
}
