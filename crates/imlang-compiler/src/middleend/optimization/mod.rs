// 最適化モジュール
//
// AST から AST への純粋な書き換えを行う。
// - 定数畳み込み（constant_folding）
// - 不要コード除去：条件がリテラルの if / while を畳み、空文をブロックから取り除く
//
// 意味解析のシンボルテーブルには依存しない。

pub mod constant_folding;

use crate::frontend::ast::{
    Block, BlockItem, Decl, ExprKind, Program, RoutineBody, RoutineDecl, Stmt, StmtKind, VarDecl,
};

use constant_folding::ConstantFolder;

/// 最適化統計情報
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptimizationStats {
    /// 畳み込まれた式の数
    pub constants_folded: usize,
    /// 除去・置換された文の数
    pub statements_removed: usize,
}

/// プログラム最適化器
#[derive(Debug, Default)]
pub struct ProgramOptimizer {
    folder: ConstantFolder,
    statements_removed: usize,
}

impl ProgramOptimizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> OptimizationStats {
        OptimizationStats {
            constants_folded: self.folder.folded_count(),
            statements_removed: self.statements_removed,
        }
    }

    pub fn optimize(&mut self, program: &Program) -> Program {
        let declarations = program.declarations.iter().map(|decl| self.declaration(decl)).collect();
        let stats = self.stats();
        log::debug!(
            "最適化完了: 畳み込み {} 件, 除去 {} 件",
            stats.constants_folded,
            stats.statements_removed
        );
        Program { span: program.span, declarations }
    }

    fn declaration(&mut self, decl: &Decl) -> Decl {
        match decl {
            Decl::Var(var) => Decl::Var(self.var_decl(var)),
            Decl::Type(type_decl) => Decl::Type(type_decl.clone()),
            Decl::Routine(routine) => Decl::Routine(self.routine(routine)),
        }
    }

    fn var_decl(&mut self, decl: &VarDecl) -> VarDecl {
        VarDecl {
            initializer: decl.initializer.as_ref().map(|init| self.folder.fold(init).into_owned()),
            ..decl.clone()
        }
    }

    fn routine(&mut self, decl: &RoutineDecl) -> RoutineDecl {
        let body = decl.body.as_ref().map(|body| match body {
            RoutineBody::Expr(expr) => RoutineBody::Expr(self.folder.fold(expr).into_owned()),
            RoutineBody::Block(block) => RoutineBody::Block(self.block(block)),
        });
        RoutineDecl { body, ..decl.clone() }
    }

    /// ブロック内を書き換え、空文を取り除く
    fn block(&mut self, block: &Block) -> Block {
        let items = block
            .items
            .iter()
            .filter_map(|item| match item {
                BlockItem::Decl(decl) => Some(BlockItem::Decl(self.declaration(decl))),
                BlockItem::Stmt(stmt) => {
                    let stmt = self.statement(stmt);
                    (!stmt.is_empty()).then_some(BlockItem::Stmt(stmt))
                }
            })
            .collect();
        Block { span: block.span, items }
    }

    fn statement(&mut self, stmt: &Stmt) -> Stmt {
        let span = stmt.span;
        let kind = match &stmt.kind {
            StmtKind::Assign { target, value } => StmtKind::Assign {
                target: self.folder.fold(target).into_owned(),
                value: self.folder.fold(value).into_owned(),
            },
            StmtKind::Call { name, args } => StmtKind::Call {
                name: name.clone(),
                args: args.iter().map(|arg| self.folder.fold(arg).into_owned()).collect(),
            },
            StmtKind::If { condition, then_block, else_block } => {
                let condition = self.folder.fold(condition).into_owned();
                match condition.kind {
                    ExprKind::Boolean(true) => {
                        self.statements_removed += 1;
                        StmtKind::Block(self.block(then_block))
                    }
                    ExprKind::Boolean(false) => {
                        self.statements_removed += 1;
                        match else_block {
                            Some(else_block) => StmtKind::Block(self.block(else_block)),
                            None => StmtKind::Empty,
                        }
                    }
                    _ => StmtKind::If {
                        condition,
                        then_block: self.block(then_block),
                        else_block: else_block.as_ref().map(|block| self.block(block)),
                    },
                }
            }
            StmtKind::While { condition, body } => {
                let condition = self.folder.fold(condition).into_owned();
                if matches!(condition.kind, ExprKind::Boolean(false)) {
                    self.statements_removed += 1;
                    StmtKind::Empty
                } else {
                    StmtKind::While { condition, body: self.block(body) }
                }
            }
            StmtKind::For { iterator, first, second, reverse, body } => StmtKind::For {
                iterator: iterator.clone(),
                first: self.folder.fold(first).into_owned(),
                second: second.as_ref().map(|second| self.folder.fold(second).into_owned()),
                reverse: *reverse,
                body: self.block(body),
            },
            StmtKind::Return(value) => {
                StmtKind::Return(value.as_ref().map(|value| self.folder.fold(value).into_owned()))
            }
            StmtKind::Print(items) => {
                StmtKind::Print(items.iter().map(|item| self.folder.fold(item).into_owned()).collect())
            }
            StmtKind::Empty => StmtKind::Empty,
            StmtKind::Block(block) => StmtKind::Block(self.block(block)),
        };
        Stmt::new(span, kind)
    }
}

/// プログラムを最適化する
pub fn optimize(program: &Program) -> Program {
    ProgramOptimizer::new().optimize(program)
}
