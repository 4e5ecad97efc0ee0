// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Hand-written recursive-descent parser, per §4.3. This replaces an
//! earlier LALR grammar with identical behavior: productions build AST
//! nodes directly through the namespace (so a variable reference is
//! resolved to a `VarId` the moment it is seen) and a whole equation's
//! worth of speculative symbol allocation rolls back atomically on a parse
//! error, via [`crate::namespace::SymbolNamespace::delete_all_unconfirmed`].

use crate::ast::{
    BinaryOp, Equation, EquationKind, Expr, FuncRef, InterpMode, Lhs, Loc, LogicalOp, SymbolList,
    SymbolListEntry, Table, UnaryOp,
};
use crate::common::{Diag, ErrorCode};
use crate::diagnostics::Log;
use crate::functions::{self, SymbolClass};
use crate::lexer::{Pos, Token, TokenNormalizer};
use crate::model::{Project, VarKind};

pub struct Parser<'a> {
    lexer: TokenNormalizer<'a>,
    /// A small lookahead queue rather than a single peeked slot: multi-token
    /// speculative matches (`:and:`, `:or:`, `:not:`, the LHS interpolation
    /// keywords) need to peek three tokens ahead and, on a mismatch, put all
    /// of them back rather than discarding the ones already inspected.
    pending: std::collections::VecDeque<(Token, Pos)>,
    byte_pos: u32,
    /// Source position of the most recently buffered token, for diagnostics
    /// (`spec.md` §4.3's "on syntax error, emit `line:col in file`").
    cur_pos: Pos,
    synth_counter: u32,
}

type PResult<T> = Result<T, Diag>;

impl<'a> Parser<'a> {
    pub fn new(src: &'a str) -> Self {
        Parser {
            lexer: TokenNormalizer::new(src),
            pending: std::collections::VecDeque::new(),
            byte_pos: 0,
            cur_pos: Pos { line: 1, col: 1 },
            synth_counter: 0,
        }
    }

    fn loc(&self) -> Loc {
        Loc::new(self.byte_pos as usize, self.byte_pos as usize)
    }

    /// Ensure at least `n + 1` tokens are buffered.
    fn fill(&mut self, n: usize) -> PResult<()> {
        while self.pending.len() <= n {
            let tok = self.lexer.next()?;
            let pos = self.lexer.pos();
            let at_eof = matches!(tok, Token::Eof);
            self.pending.push_back((tok, pos));
            if at_eof {
                break;
            }
        }
        Ok(())
    }

    fn bump(&mut self) -> PResult<Token> {
        self.fill(0)?;
        let (tok, pos) = self.pending.pop_front().unwrap_or((Token::Eof, self.cur_pos));
        self.cur_pos = pos;
        Ok(tok)
    }

    fn peek(&mut self) -> PResult<&Token> {
        self.fill(0)?;
        Ok(&self.pending.front().unwrap().0)
    }

    /// Match a `:keyword:` token triple (colon, identifier whose canonical
    /// form is `keyword`, colon) without consuming on a mismatch.
    fn eat_colon_keyword(&mut self, keyword: &str) -> PResult<bool> {
        self.fill(2)?;
        let is_match = matches!(self.pending.front(), Some((Token::Punct(":"), _)))
            && matches!(self.pending.get(1), Some((Token::Ident(s), _)) if crate::common::canonicalize(s).as_str() == keyword)
            && matches!(self.pending.get(2), Some((Token::Punct(":"), _)));
        if is_match {
            self.cur_pos = self.pending[2].1;
            self.pending.drain(0..3);
        }
        Ok(is_match)
    }

    /// Consume a `***...` group header (§4.2) if one is next, returning its
    /// name. Group markers only occur between equation blocks, never inside
    /// one, so this is checked the same way as `Token::BlockEnd` in
    /// `parse_model`'s loop rather than woven into the expression grammar.
    fn eat_group(&mut self) -> PResult<Option<String>> {
        if !matches!(self.peek()?, Token::Group(_)) {
            return Ok(None);
        }
        match self.bump()? {
            Token::Group(name) => Ok(Some(name)),
            _ => unreachable!("just matched Token::Group above"),
        }
    }

    fn eat_punct(&mut self, p: &str) -> PResult<bool> {
        let matched = matches!(self.peek()?, Token::Punct(s) if *s == p);
        if matched {
            self.bump()?;
        }
        Ok(matched)
    }

    fn expect_punct(&mut self, p: &str) -> PResult<()> {
        if self.eat_punct(p)? {
            Ok(())
        } else {
            Err(self.err(ErrorCode::UnexpectedEof, format!("expected '{p}'")))
        }
    }

    fn err(&self, code: ErrorCode, message: impl Into<String>) -> Diag {
        Diag {
            line: self.cur_pos.line,
            column: self.cur_pos.col,
            file: None,
            code,
            message: message.into(),
        }
    }

    /// A fresh, legal XMILE identifier for a hoisted memory-call placeholder
    /// (§4.3): `<hint> N`, bumping `N` until it doesn't collide with an
    /// existing symbol. `hint` is the call's function name, so e.g. a
    /// non-root `SMOOTH(...)` hoists to `smooth 1`.
    fn fresh_synthetic_name(&mut self, project: &Project, hint: &str) -> String {
        loop {
            self.synth_counter += 1;
            let candidate = format!("{hint} {}", self.synth_counter);
            if project.namespace.find(&candidate).is_none() {
                return candidate;
            }
        }
    }

    /// Placeholder synthesis (§4.3): for every `FunctionCallWithMemory` that
    /// is not itself the root of a top-level equation, hoist it into a fresh
    /// synthetic variable whose own equation holds the call, and replace the
    /// occurrence with a reference to that variable. `Paren`/unary-plus
    /// wrappers are transparent to "is root", matching
    /// `passes::typing::root_call`'s own treatment.
    fn hoist_memory_calls(&mut self, project: &mut Project, expr: Expr, at_root: bool) -> Expr {
        match expr {
            Expr::Paren(inner, loc) => {
                Expr::Paren(Box::new(self.hoist_memory_calls(project, *inner, at_root)), loc)
            }
            Expr::Unary(UnaryOp::Positive, inner, loc) => Expr::Unary(
                UnaryOp::Positive,
                Box::new(self.hoist_memory_calls(project, *inner, at_root)),
                loc,
            ),
            Expr::Unary(op, inner, loc) => {
                Expr::Unary(op, Box::new(self.hoist_memory_calls(project, *inner, false)), loc)
            }
            Expr::Binary(op, lhs, rhs, loc) => Expr::Binary(
                op,
                Box::new(self.hoist_memory_calls(project, *lhs, false)),
                Box::new(self.hoist_memory_calls(project, *rhs, false)),
                loc,
            ),
            Expr::Logical(op, lhs, rhs, loc) => Expr::Logical(
                op,
                Box::new(self.hoist_memory_calls(project, *lhs, false)),
                Box::new(self.hoist_memory_calls(project, *rhs, false)),
                loc,
            ),
            Expr::FunctionCall(func, args, loc) => {
                let args = args
                    .into_iter()
                    .map(|a| self.hoist_memory_calls(project, a, false))
                    .collect();
                Expr::FunctionCall(func, args, loc)
            }
            Expr::Lookup(target, arg, loc) => Expr::Lookup(
                Box::new(self.hoist_memory_calls(project, *target, false)),
                Box::new(self.hoist_memory_calls(project, *arg, false)),
                loc,
            ),
            Expr::WithLookup(subject, table, loc) => Expr::WithLookup(
                Box::new(self.hoist_memory_calls(project, *subject, false)),
                table,
                loc,
            ),
            Expr::FunctionCallWithMemory(func, args, _, loc) => {
                let args: Vec<Expr> = args
                    .into_iter()
                    .map(|a| self.hoist_memory_calls(project, a, false))
                    .collect();
                if at_root {
                    Expr::FunctionCallWithMemory(func, args, None, loc)
                } else {
                    let hint = match &func {
                        FuncRef::Builtin(idx) => functions::lookup(*idx).name,
                        FuncRef::Unknown(name) => name.as_str(),
                    };
                    let placeholder_name = self.fresh_synthetic_name(project, hint);
                    let placeholder = project.namespace.insert(&placeholder_name);
                    project.declare(placeholder, VarKind::DelayAux).is_synthesized = true;
                    let call = Expr::FunctionCallWithMemory(func, args, Some(placeholder), loc);
                    project.var_mut(placeholder).equations.push(Equation {
                        lhs: Lhs {
                            var: placeholder,
                            subscripts: None,
                            except: Vec::new(),
                            interp: InterpMode::Default,
                            loc,
                        },
                        rhs: call,
                        kind: EquationKind::Definition,
                        units: None,
                        comment: None,
                    });
                    Expr::VariableRef(placeholder, None, loc)
                }
            }
            other => other,
        }
    }

    /// Parse every equation block up to the sketch boundary, inserting
    /// variables into `project` as they're found. Parse errors are logged
    /// and the offending block's speculative namespace allocations are
    /// rolled back; parsing resumes at the next `|`, per §7's recovery rule.
    pub fn parse_model(&mut self, project: &mut Project, log: &mut Log) {
        loop {
            match self.lexer.at_sketch_boundary() {
                Ok(true) => break,
                Ok(false) => {}
                Err(diag) => {
                    log.push(&diag);
                    break;
                }
            }
            match self.peek() {
                Ok(Token::Eof) => break,
                Ok(Token::BlockEnd) => {
                    let _ = self.bump();
                    continue;
                }
                _ => {}
            }

            match self.eat_colon_keyword("macro") {
                Ok(true) => {
                    if let Some(macro_def) = self.parse_macro(log) {
                        project.macros.push(macro_def);
                    }
                    continue;
                }
                Ok(false) => {}
                Err(diag) => {
                    log.push(&diag);
                    break;
                }
            }

            // A `***...` group/sector marker (§4.2) is consumed and discarded
            // here, not turned into a `ModelGroup`: `view::parse_sketch`
            // already pushes one `ModelGroup` per `*View N` sketch section,
            // and `passes::views::run` derives every group's variable
            // membership from its view, not from this equation-level marker
            // (Vensim's sector header and its view title are independent
            // strings and don't always match, as in this crate's own
            // `.Control`/`View 1` test fixture). A second, view-less
            // `ModelGroup` from this marker would only confuse that
            // ownership model, so this marker's sole job here is to stop it
            // from being mis-parsed as an equation's left-hand side.
            match self.eat_group() {
                Ok(Some(_name)) => continue,
                Ok(None) => {}
                Err(diag) => {
                    log.push(&diag);
                    break;
                }
            }

            match self.parse_equation_block(project) {
                Ok(Some(())) => project.namespace.confirm_all(),
                Ok(None) => {}
                Err(diag) => {
                    log.push(&diag);
                    project.namespace.delete_all_unconfirmed();
                    self.recover_to_block_end();
                }
            }
        }
    }

    /// `:MACRO: name(param1, param2) ... :END OF MACRO:`, per §4.3: "opens a
    /// fresh namespace for equations until `:END OF MACRO:`." The macro body
    /// is parsed with the same equation-block loop `parse_model` itself
    /// uses, against a fresh [`Project`] so macro-local variables (including
    /// its own parameters, lazily declared the first time an equation
    /// references them) never leak into the enclosing model's namespace.
    fn parse_macro(&mut self, log: &mut Log) -> Option<crate::model::MacroDef> {
        let name = match self.expect_ident() {
            Ok(n) => n,
            Err(diag) => {
                log.push(&diag);
                self.recover_to_block_end();
                return None;
            }
        };

        let mut params = Vec::new();
        if self.eat_punct("(").unwrap_or(false) {
            loop {
                match self.expect_ident() {
                    Ok(p) => params.push(p),
                    Err(diag) => {
                        log.push(&diag);
                        break;
                    }
                }
                if !self.eat_punct(",").unwrap_or(false) {
                    break;
                }
            }
            let _ = self.expect_punct(")");
        }

        let mut macro_project = Project::new(name.clone());
        for param in &params {
            let id = macro_project.namespace.insert(param);
            macro_project.declare(id, VarKind::Unknown);
        }
        macro_project.namespace.confirm_all();

        loop {
            match self.eat_colon_keyword("end of macro") {
                Ok(true) => break,
                Ok(false) => {}
                Err(diag) => {
                    log.push(&diag);
                    break;
                }
            }
            match self.peek() {
                Ok(Token::Eof) => break,
                Ok(Token::BlockEnd) => {
                    let _ = self.bump();
                    continue;
                }
                _ => {}
            }
            match self.parse_equation_block(&mut macro_project) {
                Ok(Some(())) => macro_project.namespace.confirm_all(),
                Ok(None) => {}
                Err(diag) => {
                    log.push(&diag);
                    macro_project.namespace.delete_all_unconfirmed();
                    self.recover_to_block_end();
                }
            }
        }

        Some(crate::model::MacroDef {
            name,
            params,
            project: macro_project,
        })
    }

    /// The unconsumed source tail once `parse_model` has stopped, i.e. the
    /// sketch section and settings block, for [`crate::view::parse`] and
    /// [`crate::settings`] to read separately.
    pub fn remaining_src(&self) -> &'a str {
        self.lexer.remaining()
    }

    fn recover_to_block_end(&mut self) {
        loop {
            match self.bump() {
                Ok(Token::BlockEnd) | Ok(Token::Eof) => break,
                Ok(_) => continue,
                Err(_) => continue,
            }
        }
    }

    /// One `lhs = rhs ~ units ~ comment |` (or `:`/`:=`/`<->` variant) block.
    fn parse_equation_block(&mut self, project: &mut Project) -> PResult<Option<()>> {
        let lhs = self.parse_lhs(project)?;

        let kind = if self.eat_punct("=")? {
            EquationKind::Definition
        } else if self.eat_punct(":=")? {
            EquationKind::DataEquals
        } else if self.eat_punct("<->")? {
            EquationKind::Equivalence
        } else if self.eat_punct(":")? {
            EquationKind::SubscriptRange
        } else if matches!(self.peek()?, Token::Punct("(")) {
            EquationKind::LookupTable
        } else {
            return Err(self.err(
                ErrorCode::UnrecognizedToken,
                "expected '=', ':', ':=', or '<->' after left-hand side",
            ));
        };

        let rhs = if kind == EquationKind::LookupTable {
            self.parse_table_literal()?
        } else if kind == EquationKind::SubscriptRange {
            self.parse_symbol_list_expr(project)?
        } else {
            let parsed = self.parse_expr(project, 0)?;
            self.hoist_memory_calls(project, parsed, true)
        };

        let units = self.parse_optional_units_field()?;
        let comment = self.parse_optional_comment_field()?;
        self.expect_punct("|")?;

        let equation = Equation {
            lhs,
            rhs,
            kind,
            units,
            comment,
        };
        let var = project.var_mut(equation.lhs.var);
        var.equations.push(equation);
        Ok(Some(()))
    }

    fn parse_optional_units_field(&mut self) -> PResult<Option<String>> {
        if !matches!(self.peek()?, Token::FieldSep) {
            return Ok(None);
        }
        self.bump()?;
        let mut parts = Vec::new();
        loop {
            match self.peek()? {
                Token::FieldSep | Token::BlockEnd | Token::Eof => break,
                _ => {
                    parts.push(self.token_text(self.bump()?));
                }
            }
        }
        let text = parts.join(" ").trim().to_string();
        Ok((!text.is_empty()).then_some(text))
    }

    fn parse_optional_comment_field(&mut self) -> PResult<Option<String>> {
        if !matches!(self.peek()?, Token::FieldSep) {
            return Ok(None);
        }
        self.bump()?;
        let mut parts = Vec::new();
        loop {
            match self.peek()? {
                Token::FieldSep | Token::BlockEnd | Token::Eof => break,
                _ => parts.push(self.token_text(self.bump()?)),
            }
        }
        let text = parts.join(" ").trim().to_string();
        Ok((!text.is_empty()).then_some(text))
    }

    fn token_text(&self, tok: Token) -> String {
        match tok {
            Token::Ident(s) => s,
            Token::Quoted(s) => s,
            Token::Number(n) => format!("{n}"),
            Token::Punct(p) => p.to_string(),
            Token::Opaque(s) => s,
            Token::TabRow(_) | Token::FieldSep | Token::BlockEnd | Token::Group(_) | Token::Eof => {
                String::new()
            }
        }
    }

    fn parse_lhs(&mut self, project: &mut Project) -> PResult<Lhs> {
        let loc = self.loc();
        let name = self.expect_ident()?;
        let var = project.namespace.insert(&name);
        project.declare(var, VarKind::Unknown);

        let subscripts = if self.eat_punct("[")? {
            let list = self.parse_symbol_list(project)?;
            self.expect_punct("]")?;
            Some(list)
        } else {
            None
        };

        let mut except = Vec::new();
        while self.eat_colon_keyword("except")? {
            self.expect_punct("[")?;
            except.push(self.parse_symbol_list(project)?);
            self.expect_punct("]")?;
        }

        let interp = self.parse_optional_interp_mode()?;

        Ok(Lhs {
            var,
            subscripts,
            except,
            interp,
            loc,
        })
    }

    fn parse_optional_interp_mode(&mut self) -> PResult<InterpMode> {
        if self.eat_colon_keyword("interpolate")? {
            return Ok(InterpMode::Interpolate);
        }
        if self.eat_colon_keyword("raw")? {
            return Ok(InterpMode::Raw);
        }
        if self.eat_colon_keyword("hold backward")? {
            return Ok(InterpMode::HoldBackward);
        }
        if self.eat_colon_keyword("look forward")? {
            return Ok(InterpMode::LookForward);
        }
        Ok(InterpMode::Default)
    }

    fn expect_ident(&mut self) -> PResult<String> {
        match self.bump()? {
            Token::Ident(s) => Ok(s),
            Token::Quoted(s) => Ok(s),
            _ => Err(self.err(ErrorCode::UnrecognizedToken, "expected an identifier")),
        }
    }

    fn parse_symbol_list(&mut self, project: &mut Project) -> PResult<SymbolList> {
        let mut entries = Vec::new();
        loop {
            let name = self.expect_ident()?;
            let var = project.namespace.insert(&name);
            project.declare(var, VarKind::ArrayElement);
            let bang = self.eat_punct("!")?;
            entries.push(SymbolListEntry::Symbol { var, bang });
            if !self.eat_punct(",")? {
                break;
            }
        }
        Ok(SymbolList {
            entries,
            map_range: None,
        })
    }

    fn parse_symbol_list_expr(&mut self, project: &mut Project) -> PResult<Expr> {
        let loc = self.loc();
        self.expect_punct("(")?;
        let list = self.parse_symbol_list(project)?;
        self.expect_punct(")")?;
        Ok(Expr::SymbolListExpr(list, None, loc))
    }

    /// `( [(x1,y1)-(x2,y2)] , (x,y) , (x,y) , ... )`, per §4.3's "Table ranges
    /// `[(x1,y1)-(x2,y2)]` are recorded but not enforced" and the `(x,y)`
    /// point-pair shape used both here and by `WITH LOOKUP`'s inline table.
    fn parse_table_literal(&mut self) -> PResult<Expr> {
        let loc = self.loc();
        self.expect_punct("(")?;
        let range = if self.eat_punct("[")? {
            let (x1, y1) = self.parse_table_point()?;
            self.expect_punct("-")?;
            let (x2, y2) = self.parse_table_point()?;
            self.expect_punct("]")?;
            self.expect_punct(",")?;
            Some((x1, x2, y1, y2))
        } else {
            None
        };
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        loop {
            let (x, y) = self.parse_table_point()?;
            xs.push(x);
            ys.push(y);
            if !self.eat_punct(",")? {
                break;
            }
        }
        self.expect_punct(")")?;
        Ok(Expr::TableDef(
            Table {
                xs,
                ys,
                range,
                extrapolate: false,
            },
            loc,
        ))
    }

    fn parse_table_point(&mut self) -> PResult<(f64, f64)> {
        self.expect_punct("(")?;
        let x = self.expect_number()?;
        self.expect_punct(",")?;
        let y = self.expect_number()?;
        self.expect_punct(")")?;
        Ok((x, y))
    }

    fn expect_number(&mut self) -> PResult<f64> {
        let negative = self.eat_punct("-")?;
        if !negative {
            self.eat_punct("+")?;
        }
        match self.bump()? {
            Token::Number(n) => Ok(if negative { -n } else { n }),
            _ => Err(self.err(ErrorCode::BadTable, "expected a numeric table entry")),
        }
    }

    // --- expression grammar -------------------------------------------------
    //
    // precedence, low to high:
    //   0: :OR:
    //   1: :AND:
    //   2: relational (=, <>, <, >, <=, >=)
    //   3: + -
    //   4: * /
    //   5: unary + - :NOT:
    //   6: ^ (right-assoc)
    //   7: primary

    fn parse_expr(&mut self, project: &mut Project, min_bp: u8) -> PResult<Expr> {
        let mut lhs = self.parse_unary(project)?;
        loop {
            let (op_kind, bp, right_assoc) = match self.peek_operator()? {
                Some(x) => x,
                None => break,
            };
            if bp < min_bp {
                break;
            }
            self.consume_operator(&op_kind)?;
            let next_min = if right_assoc { bp } else { bp + 1 };
            let rhs = self.parse_expr(project, next_min)?;
            let loc = Loc::merge(lhs.loc(), rhs.loc());
            lhs = match op_kind {
                OpKind::Logical(l) => Expr::Logical(l, Box::new(lhs), Box::new(rhs), loc),
                OpKind::Binary(b) => Expr::Binary(b, Box::new(lhs), Box::new(rhs), loc),
            };
        }
        Ok(lhs)
    }

    /// Look ahead for the next binary/logical operator and, if found,
    /// consume it immediately (a `:and:`/`:or:` match needs three tokens of
    /// lookahead to detect, so there is no cheaper way to "peek" it; a
    /// single-token punctuation operator is consumed in
    /// [`Parser::consume_operator`] instead, to keep this function a pure
    /// peek in the common case).
    fn peek_operator(&mut self) -> PResult<Option<(OpKind, u8, bool)>> {
        if matches!(self.peek()?, Token::Punct(":")) {
            if self.eat_colon_keyword("and")? {
                return Ok(Some((OpKind::Logical(LogicalOp::And), 1, false)));
            }
            if self.eat_colon_keyword("or")? {
                return Ok(Some((OpKind::Logical(LogicalOp::Or), 0, false)));
            }
        }
        let bp = match self.peek()? {
            Token::Punct("+") => Some((OpKind::Binary(BinaryOp::Add), 3, false)),
            Token::Punct("-") => Some((OpKind::Binary(BinaryOp::Sub), 3, false)),
            Token::Punct("*") => Some((OpKind::Binary(BinaryOp::Mul), 4, false)),
            Token::Punct("/") => Some((OpKind::Binary(BinaryOp::Div), 4, false)),
            Token::Punct("^") => Some((OpKind::Binary(BinaryOp::Exp), 6, true)),
            Token::Punct("=") => Some((OpKind::Binary(BinaryOp::Eq), 2, false)),
            Token::Punct("<>") => Some((OpKind::Binary(BinaryOp::Neq), 2, false)),
            Token::Punct("<") => Some((OpKind::Binary(BinaryOp::Lt), 2, false)),
            Token::Punct(">") => Some((OpKind::Binary(BinaryOp::Gt), 2, false)),
            Token::Punct("<=") => Some((OpKind::Binary(BinaryOp::Lte), 2, false)),
            Token::Punct(">=") => Some((OpKind::Binary(BinaryOp::Gte), 2, false)),
            _ => None,
        };
        Ok(bp)
    }

    fn consume_operator(&mut self, kind: &OpKind) -> PResult<()> {
        // Logical operators are already consumed by peek_operator's
        // eat_colon_keyword match; only a punctuation operator still needs
        // consuming here.
        if let OpKind::Binary(_) = kind {
            self.bump()?;
        }
        Ok(())
    }

    fn parse_unary(&mut self, project: &mut Project) -> PResult<Expr> {
        let loc = self.loc();
        if self.eat_punct("+")? {
            let inner = self.parse_unary(project)?;
            return Ok(Expr::Unary(UnaryOp::Positive, Box::new(inner), loc));
        }
        if self.eat_punct("-")? {
            let inner = self.parse_unary(project)?;
            return Ok(Expr::Unary(UnaryOp::Negative, Box::new(inner), loc));
        }
        if self.eat_colon_keyword("not")? {
            let inner = self.parse_unary(project)?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(inner), loc));
        }
        self.parse_postfix(project)
    }

    fn parse_postfix(&mut self, project: &mut Project) -> PResult<Expr> {
        let mut expr = self.parse_primary(project)?;
        loop {
            if self.eat_punct("(")? {
                // `table(x)` lookup invocation, only valid after a bare
                // variable reference.
                let arg = self.parse_expr(project, 0)?;
                self.expect_punct(")")?;
                let loc = Loc::merge(expr.loc(), arg.loc());
                expr = Expr::Lookup(Box::new(expr), Box::new(arg), loc);
                continue;
            }
            break;
        }
        Ok(expr)
    }

    fn parse_primary(&mut self, project: &mut Project) -> PResult<Expr> {
        let loc = self.loc();
        match self.bump()? {
            Token::Number(n) => Ok(Expr::Number(n, loc)),
            Token::Quoted(s) => Ok(Expr::Literal(s, loc)),
            Token::Punct("(") => {
                let inner = self.parse_expr(project, 0)?;
                self.expect_punct(")")?;
                Ok(Expr::Paren(Box::new(inner), Loc::merge(loc, inner.loc())))
            }
            Token::Ident(name) => self.parse_ident_expr(project, name, loc),
            other => Err(self.err(
                ErrorCode::UnrecognizedToken,
                format!("unexpected token in expression: {other:?}"),
            )),
        }
    }

    fn parse_ident_expr(&mut self, project: &mut Project, name: String, loc: Loc) -> PResult<Expr> {
        if crate::common::canonicalize(&name).as_str() == "na" {
            return Ok(Expr::Na(loc));
        }

        match functions::classify_symbol(&name) {
            SymbolClass::Builtin(idx) => {
                if matches!(self.peek()?, Token::Punct("(")) {
                    self.bump()?;
                    let args = self.parse_call_args(project)?;
                    self.expect_punct(")")?;
                    let end_loc = Loc::merge(loc, self.loc());
                    let def = functions::lookup(idx);
                    if def.is_memoryless() {
                        Ok(Expr::FunctionCall(FuncRef::Builtin(idx), args, end_loc))
                    } else {
                        // Placeholder synthesis (§4.3) happens once the whole
                        // equation is parsed, in `hoist_memory_calls`, since
                        // whether this call needs one depends on whether it
                        // turns out to be the root of the top-level equation.
                        Ok(Expr::FunctionCallWithMemory(
                            FuncRef::Builtin(idx),
                            args,
                            None,
                            end_loc,
                        ))
                    }
                } else {
                    // bare builtin name used as an identifier (rare, but the
                    // registry is advisory, not reserved)
                    self.resolve_variable_ref(project, &name, loc)
                }
            }
            SymbolClass::WithLookup => {
                self.expect_punct("(")?;
                let subject = self.parse_expr(project, 0)?;
                self.expect_punct(",")?;
                let table_expr = self.parse_table_literal()?;
                self.expect_punct(")")?;
                let Expr::TableDef(table, _) = table_expr else {
                    unreachable!("parse_table_literal always returns TableDef")
                };
                let end_loc = Loc::merge(loc, self.loc());
                Ok(Expr::WithLookup(Box::new(subject), table, end_loc))
            }
            SymbolClass::TabbedArray | SymbolClass::GetXls(_) => {
                let text = self.lexer.read_opaque_line();
                Ok(Expr::Literal(text, loc))
            }
            SymbolClass::Regular => {
                if matches!(self.peek()?, Token::Punct("(")) {
                    self.bump()?;
                    let args = self.parse_call_args(project)?;
                    self.expect_punct(")")?;
                    let end_loc = Loc::merge(loc, self.loc());
                    Ok(Expr::FunctionCall(FuncRef::Unknown(name), args, end_loc))
                } else {
                    self.resolve_variable_ref(project, &name, loc)
                }
            }
        }
    }

    fn resolve_variable_ref(&mut self, project: &mut Project, name: &str, loc: Loc) -> PResult<Expr> {
        let var = project.namespace.insert(name);
        project.declare(var, VarKind::Unknown);
        let subscripts = if self.eat_punct("[")? {
            let list = self.parse_symbol_list(project)?;
            self.expect_punct("]")?;
            Some(list)
        } else {
            None
        };
        Ok(Expr::VariableRef(var, subscripts, loc))
    }

    fn parse_call_args(&mut self, project: &mut Project) -> PResult<Vec<Expr>> {
        let mut args = Vec::new();
        if matches!(self.peek()?, Token::Punct(")")) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr(project, 0)?);
            if !self.eat_punct(",")? {
                break;
            }
        }
        Ok(args)
    }
}

enum OpKind {
    Binary(BinaryOp),
    Logical(LogicalOp),
}

/// Parse one `.mdl` source buffer's equation section into `project`. View
/// (sketch) parsing is a separate pass invoked once this returns, since the
/// sketch section's own grammar does not share a grammar root with
/// equations (§4.5).
pub fn parse_equations<'a>(src: &'a str, project: &mut Project, log: &mut Log) -> &'a str {
    let mut parser = Parser::new(src);
    parser.parse_model(project, log);
    parser.remaining_src()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> (Project, Log) {
        let mut project = Project::new("test");
        let mut log = Log::new();
        parse_equations(src, &mut project, &mut log);
        (project, log)
    }

    #[test]
    fn parses_simple_aux_definition() {
        let (project, log) = parse("Births=birth rate*Population~Widgets/Year~comment|");
        assert!(!log.had_errors());
        let births = project.namespace.find("Births").unwrap();
        assert_eq!(project.var(births).equations.len(), 1);
    }

    #[test]
    fn parse_error_rolls_back_and_recovers() {
        let (project, log) = parse("Bad==1~~|\nGood=2~~|");
        assert!(log.had_errors());
        assert!(project.namespace.find("Bad").is_none());
        assert!(project.namespace.find("Good").is_some());
    }

    #[test]
    fn parse_error_reports_the_line_it_occurred_on() {
        let (_project, log) = parse("Good=1~~|\nBad==1~~|");
        assert!(log.had_errors());
        let rendered = log.render();
        assert!(
            rendered.contains("2:"),
            "expected the error to be reported on line 2, got: {rendered}"
        );
        assert!(
            !rendered.contains("0:0"),
            "error location should not default to 0:0, got: {rendered}"
        );
    }

    #[test]
    fn root_level_memory_call_gets_no_placeholder() {
        let (project, _log) = parse("X=SMOOTH(Y, 1)~~|");
        let x = project.namespace.find("X").unwrap();
        let eqn = &project.var(x).equations[0];
        match &eqn.rhs {
            Expr::FunctionCallWithMemory(_, _, None, _) => {}
            other => panic!("expected a root-level memory call with no placeholder, got {other:?}"),
        }
    }

    #[test]
    fn non_root_memory_call_synthesizes_placeholder() {
        let (project, _log) = parse("X=SMOOTH(Y, 1)+1~~|");
        let x = project.namespace.find("X").unwrap();
        let eqn = &project.var(x).equations[0];
        let Expr::Binary(BinaryOp::Add, lhs, _, _) = &eqn.rhs else {
            panic!("expected a top-level addition, got {:?}", eqn.rhs);
        };
        let placeholder = match lhs.as_ref() {
            Expr::VariableRef(var, None, _) => *var,
            other => panic!("expected the hoisted call replaced by a variable ref, got {other:?}"),
        };
        let placeholder_eqn = &project.var(placeholder).equations[0];
        assert!(matches!(
            placeholder_eqn.rhs,
            Expr::FunctionCallWithMemory(_, _, Some(_), _)
        ));
    }

    #[test]
    fn subscript_range_definition_parses_symbol_list() {
        let (project, log) = parse("Loc: (East,West,North)~~|");
        assert!(!log.had_errors());
        let loc = project.namespace.find("Loc").unwrap();
        assert_eq!(project.var(loc).equations[0].kind, EquationKind::SubscriptRange);
    }

    #[test]
    fn subscripted_variable_ref_parses_bracketed_element() {
        let (project, log) = parse("Loc: (East,West)~~|\nSales[East]=1~~|\nTotal=Sales[East]+Sales[West]~~|");
        assert!(!log.had_errors(), "{}", log.render());
        let total = project.namespace.find("Total").unwrap();
        let eqn = &project.var(total).equations[0];
        assert!(matches!(eqn.rhs, Expr::Binary(BinaryOp::Add, ..)));
    }

    #[test]
    fn table_literal_parses_parenthesized_pairs_with_range() {
        let (project, log) = parse("g([(0,0)-(10,10)],(0,0),(5,5),(10,10))~~|");
        assert!(!log.had_errors(), "{}", log.render());
        let g = project.namespace.find("g").unwrap();
        let eqn = &project.var(g).equations[0];
        let Expr::TableDef(table, _) = &eqn.rhs else {
            panic!("expected a table definition, got {:?}", eqn.rhs);
        };
        assert_eq!(table.xs, vec![0.0, 5.0, 10.0]);
        assert_eq!(table.ys, vec![0.0, 5.0, 10.0]);
        assert_eq!(table.range, Some((0.0, 10.0, 0.0, 10.0)));
    }

    #[test]
    fn with_lookup_parses_inline_table() {
        let (project, log) = parse("y=WITH LOOKUP(x,((0,0),(1,2),(2,4)))~~|");
        assert!(!log.had_errors(), "{}", log.render());
        let y = project.namespace.find("y").unwrap();
        let eqn = &project.var(y).equations[0];
        match &eqn.rhs {
            Expr::WithLookup(_, table, _) => {
                assert_eq!(table.xs, vec![0.0, 1.0, 2.0]);
                assert_eq!(table.ys, vec![0.0, 2.0, 4.0]);
            }
            other => panic!("expected a with-lookup expression, got {other:?}"),
        }
    }

    #[test]
    fn macro_block_is_parsed_into_its_own_project_and_not_the_outer_namespace() {
        let (project, log) = parse(
            ":MACRO: MyMacro(input, delay_time)\n\
             out = input~~|\n\
             :END OF MACRO:\n\
             X=1~~|\n",
        );
        assert!(!log.had_errors(), "{}", log.render());
        assert!(project.namespace.find("out").is_none());
        assert!(project.namespace.find("input").is_none());
        assert!(project.namespace.find("X").is_some());
        assert_eq!(project.macros.len(), 1);
        let macro_def = &project.macros[0];
        assert_eq!(macro_def.params, vec!["input", "delay_time"]);
        assert!(macro_def.project.namespace.find("out").is_some());
    }

    #[test]
    fn group_header_between_equation_blocks_does_not_error_and_does_not_block_equations() {
        let (project, log) = parse(
            "***\n\
             \t.Control\n\
             ***~\n\
             \t\tSimulation Control Parameters\n\
             \t|\n\
             X=1~~|\n",
        );
        assert!(!log.had_errors(), "{}", log.render());
        assert!(project.model.groups.is_empty());
        assert!(project.namespace.find("X").is_some());
    }
}
