//! # シンボルテーブル
//!
//! スコープのスタックとして実装されたシンボルテーブルです。
//! 一つのスコープ内で名前は一意で、内側のスコープは外側の名前を隠せます。
//! 検索は内側から外側へ向かって行います。

use std::collections::HashMap;

use super::types::TypeInfo;

/// ルーチンのシグネチャ
#[derive(Debug, Clone, PartialEq)]
pub struct RoutineSignature {
    /// 仮引数（名前と型、宣言順）
    pub params: Vec<(String, TypeInfo)>,
    /// 戻り値型（無ければ void）
    pub return_type: TypeInfo,
    /// 本体を持つ宣言が登録済みか
    pub has_body: bool,
}

impl RoutineSignature {
    /// 型の並びが一致するか（前方宣言との照合用）
    pub fn matches(&self, other: &RoutineSignature) -> bool {
        self.params.len() == other.params.len()
            && self.params.iter().zip(&other.params).all(|((_, a), (_, b))| a.same_as(b))
            && self.return_type.same_as(&other.return_type)
    }
}

/// シンボル
#[derive(Debug, Clone, PartialEq)]
pub enum Symbol {
    /// 変数
    Var { ty: TypeInfo },
    /// 型
    Type { ty: TypeInfo },
    /// ルーチン
    Routine(RoutineSignature),
}

/// スコープの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// グローバルスコープ
    Global,
    /// ルーチン本体
    Routine,
    /// if / 差し込みブロック
    Block,
    /// while / for
    Loop,
}

#[derive(Debug)]
struct Scope {
    kind: ScopeKind,
    symbols: HashMap<String, Symbol>,
}

/// スコープスタック
#[derive(Debug)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
}

impl SymbolTable {
    /// グローバルスコープのみを持つテーブルを作成
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope { kind: ScopeKind::Global, symbols: HashMap::new() }],
        }
    }

    pub fn enter_scope(&mut self, kind: ScopeKind) {
        self.scopes.push(Scope { kind, symbols: HashMap::new() });
    }

    /// 現在のスコープを破棄する。グローバルスコープは残る。
    pub fn exit_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn current_kind(&self) -> ScopeKind {
        self.scopes.last().map(|scope| scope.kind).unwrap_or(ScopeKind::Global)
    }

    /// 現在のスコープに定義する。既に同名があれば `false`。
    pub fn define(&mut self, name: &str, symbol: Symbol) -> bool {
        let Some(scope) = self.scopes.last_mut() else {
            return false;
        };
        if scope.symbols.contains_key(name) {
            return false;
        }
        scope.symbols.insert(name.to_string(), symbol);
        true
    }

    /// 内側から外側へ検索
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.scopes.iter().rev().find_map(|scope| scope.symbols.get(name))
    }

    /// グローバルスコープのシンボルを可変で取得
    pub fn global_mut(&mut self, name: &str) -> Option<&mut Symbol> {
        self.scopes.first_mut().and_then(|scope| scope.symbols.get_mut(name))
    }

    /// 名前が型を表していればその型
    pub fn lookup_type(&self, name: &str) -> Option<TypeInfo> {
        match self.lookup(name) {
            Some(Symbol::Type { ty }) => Some(ty.clone()),
            _ => None,
        }
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_scope_shadows_outer() {
        let mut table = SymbolTable::new();
        assert!(table.define("x", Symbol::Var { ty: TypeInfo::INTEGER }));
        table.enter_scope(ScopeKind::Block);
        assert!(table.define("x", Symbol::Var { ty: TypeInfo::REAL }));
        assert_eq!(table.lookup("x"), Some(&Symbol::Var { ty: TypeInfo::REAL }));
        table.exit_scope();
        assert_eq!(table.lookup("x"), Some(&Symbol::Var { ty: TypeInfo::INTEGER }));
    }

    #[test]
    fn duplicate_in_same_scope_is_rejected() {
        let mut table = SymbolTable::new();
        assert!(table.define("x", Symbol::Var { ty: TypeInfo::INTEGER }));
        assert!(!table.define("x", Symbol::Var { ty: TypeInfo::BOOLEAN }));
    }

    #[test]
    fn global_scope_is_never_popped() {
        let mut table = SymbolTable::new();
        table.exit_scope();
        assert_eq!(table.depth(), 1);
        assert_eq!(table.current_kind(), ScopeKind::Global);
    }
}
