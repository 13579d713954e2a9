//! Análisis semántico.
//!
//! Recorre el árbol una sola vez, poblando una [`SymbolTable`] y
//! reportando hallazgos en un registro de [`Diagnostics`]. El árbol nunca
//! se modifica. Ningún hallazgo interrumpe el recorrido: un tipo que no
//! se puede resolver se propaga como desconocido (`None`), lo cual
//! suprime errores en cascada en las expresiones que lo contienen.

use std::collections::HashSet;

use thiserror::Error;

use crate::{
    ast::{self, Block, Expr, Identifier, Literal, Statement, StatementKind, UnaryOp},
    error::Diagnostics,
    source::{Located, Position},
    symbol::{Signature, Symbol, SymbolKind, SymbolTable},
    types::Type,
};

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SemanticError {
    #[error("Symbol `{0}` is already declared in this scope")]
    DoubleDeclaration(Identifier),

    #[error("Unknown type `{0}`")]
    UnknownType(String),

    #[error("Variable `{0}` cannot have type `void`")]
    VoidVariable(Identifier),

    #[error("Symbol `{0}` is undefined")]
    UndeclaredIdentifier(Identifier),

    #[error("Variable `{0}` is used before being initialized")]
    UninitializedUse(Identifier),

    #[error("Symbol `{0}` is not a function")]
    NotAFunction(Identifier),

    #[error("Expected variable, found function `{0}`")]
    NotAVariable(Identifier),

    #[error("Symbol `{0}` is not an array")]
    NotAnArray(Identifier),

    #[error("Array index must be integral, found `{0}`")]
    NonIntegerIndex(Type),

    #[error("Type mismatch: expected `{expected}`, found `{found}`")]
    IncompatibleType { expected: Type, found: Type },

    #[error("Declaration of `{0}` conflicts with a previous signature")]
    IncompatibleSignature(Identifier),

    #[error("Redefinition of function `{0}`")]
    FunctionRedefinition(Identifier),

    #[error("Operator `{0}` cannot be applied to `{1}`")]
    ArithmeticTypeError(String, Type),

    #[error("Function `{name}` takes {expected} arguments, but {found} were supplied")]
    ArityMismatch {
        name: Identifier,
        expected: usize,
        found: usize,
    },

    #[error("Argument {position} of `{name}`: expected `{expected}`, found `{found}`")]
    ArgumentTypeMismatch {
        name: Identifier,
        position: usize,
        expected: Type,
        found: Type,
    },

    #[error("Function `{0}` returns `void` and its result cannot be used")]
    VoidValueUsed(Identifier),

    #[error("`break` outside of a loop")]
    BreakOutsideLoop,

    #[error("`continue` outside of a loop")]
    ContinueOutsideLoop,

    #[error("Function `{0}` must return a value of type `{1}`")]
    MissingReturn(Identifier, Type),

    #[error("`return` without a value in function `{0}`, which returns `{1}`")]
    MissingReturnValue(Identifier, Type),

    #[error("Function `{0}` returns `void` but `return` carries a value")]
    UnexpectedReturnValue(Identifier),

    #[error("`return` outside of a function")]
    ReturnOutsideFunction,

    #[error("Expected `{0}`")]
    MissingToken(&'static str),

    #[error("Variable `{0}` is never used")]
    UnusedVariable(Identifier),

    #[error("Function `{0}` is called but never defined")]
    UndefinedFunction(Identifier),
}

/// Conteos del recorrido, solo con fines de reporte.
///
/// Los tokens se reconstruyen a partir del árbol; los paréntesis de
/// agrupación no sobreviven al análisis sintáctico y no se cuentan.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Statistics {
    pub nodes: usize,
    pub tokens: usize,
}

/// Analiza una unidad de traducción completa.
pub fn analyze(program: &ast::Program, diagnostics: &mut Diagnostics) -> Statistics {
    let mut analyzer = Analyzer {
        table: SymbolTable::new(),
        diagnostics,
        loops: 0,
        function: None,
        poisoned: HashSet::new(),
        assigning: None,
        statistics: Statistics::default(),
    };

    analyzer.program(program);

    let statistics = analyzer.statistics;
    log::info!(
        "semantic analysis: {} nodes, {} tokens, {} errors, {} warnings",
        statistics.nodes,
        statistics.tokens,
        analyzer.diagnostics.error_count(),
        analyzer.diagnostics.warning_count()
    );

    statistics
}

struct FunctionContext {
    name: Identifier,

    /// `None` si el tipo de retorno no se pudo resolver.
    ret: Option<Type>,

    returned: bool,
}

struct Analyzer<'d> {
    table: SymbolTable<Symbol>,
    diagnostics: &'d mut Diagnostics,
    loops: u32,
    function: Option<FunctionContext>,

    /// Nombres cuyo tipo declarado no se pudo resolver.
    poisoned: HashSet<Identifier>,

    /// Destino de la asignación en curso, exento de `UninitializedUse`.
    assigning: Option<Identifier>,

    statistics: Statistics,
}

impl Analyzer<'_> {
    fn visit(&mut self, tokens: usize) {
        self.statistics.nodes += 1;
        self.statistics.tokens += tokens;
    }

    fn error(&mut self, error: SemanticError, at: Position) {
        self.diagnostics.error(error, at);
    }

    fn program(&mut self, program: &ast::Program) {
        self.visit(0);
        self.table.push_scope();

        self.statements(&program.statements);

        let mut warnings = Vec::new();
        self.table
            .for_each_symbol(|symbol| warnings.extend(Self::sweep(symbol)));

        self.report_warnings(warnings);
        self.table.pop_scope();
    }

    fn statements(&mut self, statements: &[Statement]) {
        for statement in statements {
            self.statement(statement);
        }
    }

    fn statement(&mut self, statement: &Statement) {
        let needs_terminator = statement.kind.needs_terminator();
        if needs_terminator && !statement.terminated {
            self.error(SemanticError::MissingToken(";"), statement.location);
        }

        let semicolon = (needs_terminator && statement.terminated) as usize;
        self.statistics.tokens += semicolon;

        self.statement_kind(&statement.kind, statement.location);
    }

    fn statement_kind(&mut self, kind: &StatementKind, at: Position) {
        match kind {
            StatementKind::Declaration(declaration) => self.declaration(declaration),
            StatementKind::Prototype(prototype) => self.prototype(prototype),
            StatementKind::Function(function) => self.function(function),
            StatementKind::Assignment(assignment) => self.assignment(assignment),

            StatementKind::Call(call) => {
                self.visit(0);
                self.call(call, false);
            }

            StatementKind::Block(block) => self.scoped_block(block),

            StatementKind::If {
                condition,
                then,
                otherwise,
            } => {
                self.visit(3 + otherwise.is_some() as usize);
                self.expr(condition);
                self.scoped_block(then);

                if let Some(otherwise) = otherwise {
                    self.scoped_block(otherwise);
                }
            }

            StatementKind::While { condition, body } => {
                self.visit(3);

                self.loops += 1;
                self.expr(condition);
                self.scoped_block(body);
                self.loops -= 1;
            }

            StatementKind::For {
                init,
                condition,
                update,
                body,
            } => {
                self.visit(5);
                self.table.push_scope();

                if let Some(init) = init {
                    self.statement_kind(&init.kind, init.location);
                }

                self.loops += 1;
                self.expr(condition);
                self.scoped_block(body);

                if let Some(update) = update {
                    self.statement_kind(&update.kind, update.location);
                }

                self.loops -= 1;
                self.pop_scope();
            }

            StatementKind::Break => {
                self.visit(1);
                if self.loops == 0 {
                    self.error(SemanticError::BreakOutsideLoop, at);
                }
            }

            StatementKind::Continue => {
                self.visit(1);
                if self.loops == 0 {
                    self.error(SemanticError::ContinueOutsideLoop, at);
                }
            }

            StatementKind::Return(value) => self.return_(value.as_ref(), at),
        }
    }

    fn scoped_block(&mut self, block: &Block) {
        self.table.push_scope();
        self.block(block);
        self.pop_scope();
    }

    /// Sentencias de un bloque en el contexto actual.
    fn block(&mut self, block: &Block) {
        self.visit(1 + block.close.is_some() as usize);
        self.statements(&block.statements);

        if block.close.is_none() {
            self.error(SemanticError::MissingToken("}"), block.open);
        }
    }

    fn pop_scope(&mut self) {
        if let Some(scope) = self.table.pop_scope() {
            let warnings = scope.symbols().filter_map(Self::sweep).collect();
            self.report_warnings(warnings);
        }
    }

    fn sweep(symbol: &Symbol) -> Option<(Position, SemanticError)> {
        let name = symbol.name.clone();
        let warning = match &symbol.kind {
            SymbolKind::Variable {
                parameter: false, ..
            } if !symbol.used => SemanticError::UnusedVariable(name),

            SymbolKind::Function(signature) if symbol.used && !signature.defined => {
                SemanticError::UndefinedFunction(name)
            }

            _ => return None,
        };

        Some((symbol.declared_at, warning))
    }

    fn report_warnings(&mut self, mut warnings: Vec<(Position, SemanticError)>) {
        warnings.sort_by_key(|(at, _)| *at);
        for (at, warning) in warnings {
            self.diagnostics.warning(warning, at);
        }
    }

    fn resolve_type(&mut self, typ: &Located<String>) -> Option<Type> {
        match typ.as_ref().parse() {
            Ok(typ) => Some(typ),
            Err(()) => {
                let unknown = SemanticError::UnknownType(typ.as_ref().clone());
                self.error(unknown, typ.location());
                None
            }
        }
    }

    fn declaration(&mut self, declaration: &ast::Declaration) {
        let array_tokens = if declaration.length.is_some() { 3 } else { 0 };
        self.visit(2 + array_tokens + declaration.init.is_some() as usize);

        let init = declaration
            .init
            .as_ref()
            .map(|init| (init.location(), self.expr(init)));

        let (at, name) = (declaration.name.location(), declaration.name.as_ref());
        if self.table.exists_in_current_scope(name.as_ref()) {
            self.error(SemanticError::DoubleDeclaration(name.clone()), at);
            return;
        }

        let typ = match self.resolve_type(&declaration.typ) {
            Some(Type::Void) => {
                self.error(SemanticError::VoidVariable(name.clone()), at);
                None
            }

            typ => typ,
        };

        let typ = match typ {
            Some(typ) => typ,
            None => {
                self.poisoned.insert(name.clone());
                return;
            }
        };

        if let Some((init_at, Some(found))) = init {
            if !typ.accepts(found) {
                let mismatch = SemanticError::IncompatibleType {
                    expected: typ,
                    found,
                };

                self.error(mismatch, init_at);
            }
        }

        let length = declaration.length.as_ref().map(|length| *length.as_ref());

        let mut symbol = Symbol::variable(name.clone(), typ, at);
        symbol.initialized = self.table.is_global_scope() || init.is_some() || length.is_some();
        symbol.kind = SymbolKind::Variable {
            length,
            parameter: false,
        };

        self.table.declare(name.clone(), symbol);
    }

    /// Resuelve los tipos de parámetros, reportando cada error una sola vez.
    fn parameter_types(&mut self, parameters: &[ast::Parameter]) -> Vec<Option<Type>> {
        // `f(void)` equivale a una lista vacía
        if let [only] = parameters {
            if only.name.is_none() && unicase::eq_ascii(only.typ.as_ref().trim(), "void") {
                return Vec::new();
            }
        }

        parameters
            .iter()
            .map(|parameter| match self.resolve_type(&parameter.typ) {
                Some(Type::Void) => {
                    let name = parameter
                        .name
                        .as_ref()
                        .map(|name| name.as_ref().clone())
                        .unwrap_or_else(|| Identifier::from("void"));

                    self.error(SemanticError::VoidVariable(name), parameter.typ.location());
                    None
                }

                typ => typ,
            })
            .collect()
    }

    fn signature_tokens(parameters: &[ast::Parameter]) -> usize {
        let named = parameters.iter().filter(|p| p.name.is_some()).count();
        let commas = parameters.len().saturating_sub(1);

        4 + parameters.len() + named + commas
    }

    /// Registra un prototipo o una definición en el contexto global.
    fn declare_function(
        &mut self,
        name: &Located<Identifier>,
        ret: Type,
        parameters: &[ast::Parameter],
        types: Vec<Type>,
        defining: bool,
    ) {
        let (at, id) = (name.location(), name.as_ref());
        let names = parameters
            .iter()
            .map(|parameter| parameter.name.as_ref().map(|name| name.as_ref().clone()))
            .collect();

        let conflict = match self.table.lookup_global_mut(id.as_ref()) {
            None => {
                let signature = Signature {
                    parameters: types,
                    names,
                    defined: defining,
                };

                let symbol = Symbol::function(id.clone(), ret, signature, at);
                self.table.declare_global(id.clone(), symbol);
                None
            }

            Some(Symbol {
                kind: SymbolKind::Variable { .. },
                ..
            }) => Some(SemanticError::DoubleDeclaration(id.clone())),

            Some(symbol) => {
                let previous = symbol.typ;
                match &mut symbol.kind {
                    SymbolKind::Function(signature)
                        if previous != ret || signature.parameters != types =>
                    {
                        Some(SemanticError::IncompatibleSignature(id.clone()))
                    }

                    SymbolKind::Function(signature) if defining && signature.defined => {
                        Some(SemanticError::FunctionRedefinition(id.clone()))
                    }

                    SymbolKind::Function(signature) => {
                        if defining {
                            signature.defined = true;
                            signature.names = names;
                        }

                        None
                    }

                    SymbolKind::Variable { .. } => None,
                }
            }
        };

        if let Some(conflict) = conflict {
            self.error(conflict, at);
        }
    }

    fn prototype(&mut self, prototype: &ast::Prototype) {
        self.visit(Self::signature_tokens(&prototype.parameters));

        let ret = self.resolve_type(&prototype.ret);
        let types = self.parameter_types(&prototype.parameters);

        let complete: Option<Vec<Type>> = types.into_iter().collect();
        if let (Some(ret), Some(complete)) = (ret, complete) {
            self.declare_function(&prototype.name, ret, &prototype.parameters, complete, false);
        }
    }

    fn function(&mut self, function: &ast::Function) {
        self.visit(Self::signature_tokens(&function.parameters));

        let ret = self.resolve_type(&function.ret);
        let types = self.parameter_types(&function.parameters);

        let complete: Option<Vec<Type>> = types.iter().copied().collect();
        if let (Some(ret), Some(complete)) = (ret, complete) {
            self.declare_function(&function.name, ret, &function.parameters, complete, true);
        }

        let name = function.name.as_ref().clone();
        let outer = self.function.replace(FunctionContext {
            name: name.clone(),
            ret,
            returned: false,
        });

        // Parámetros y cuerpo comparten un mismo contexto
        self.table.push_scope();
        for (parameter, typ) in function.parameters.iter().zip(types) {
            if let Some(name) = &parameter.name {
                self.parameter(name, typ);
            }
        }

        self.block(&function.body);
        self.pop_scope();

        let context = std::mem::replace(&mut self.function, outer);
        if let Some(FunctionContext {
            ret: Some(ret),
            returned: false,
            ..
        }) = context
        {
            if ret != Type::Void {
                let at = function.name.location();
                self.error(SemanticError::MissingReturn(name, ret), at);
            }
        }
    }

    fn parameter(&mut self, name: &Located<Identifier>, typ: Option<Type>) {
        let (at, id) = (name.location(), name.as_ref());
        if self.table.exists_in_current_scope(id.as_ref()) {
            self.error(SemanticError::DoubleDeclaration(id.clone()), at);
            return;
        }

        let typ = match typ {
            Some(typ) => typ,
            None => {
                self.poisoned.insert(id.clone());
                return;
            }
        };

        let mut symbol = Symbol::variable(id.clone(), typ, at);
        symbol.initialized = true;
        symbol.kind = SymbolKind::Variable {
            length: None,
            parameter: true,
        };

        self.table.declare(id.clone(), symbol);
    }

    fn assignment(&mut self, assignment: &ast::Assignment) {
        let target = &assignment.target;
        let index_tokens = if target.index.is_some() { 2 } else { 0 };
        self.visit(2 + index_tokens);

        let (at, name) = (target.name.location(), target.name.as_ref());

        self.assigning = Some(name.clone());
        if let Some(index) = &target.index {
            self.index(index);
        }

        let value = self.expr(&assignment.value);
        self.assigning = None;

        let error = match self.table.lookup_mut(name.as_ref()) {
            None if self.poisoned.contains(name) => None,
            None => Some((SemanticError::UndeclaredIdentifier(name.clone()), at)),
            Some(symbol) if symbol.is_function() => {
                Some((SemanticError::NotAVariable(name.clone()), at))
            }

            Some(symbol) => {
                symbol.initialized = true;

                let expected = symbol.typ;
                if target.index.is_some() && symbol.length().is_none() {
                    Some((SemanticError::NotAnArray(name.clone()), at))
                } else {
                    match value {
                        Some(found) if !expected.accepts(found) => {
                            let mismatch = SemanticError::IncompatibleType { expected, found };
                            Some((mismatch, assignment.value.location()))
                        }

                        _ => None,
                    }
                }
            }
        };

        if let Some((error, at)) = error {
            self.error(error, at);
        }
    }

    fn return_(&mut self, value: Option<&Located<Expr>>, at: Position) {
        self.visit(1);

        let found = value.map(|value| (value.location(), self.expr(value)));
        let context = match &mut self.function {
            Some(context) => context,
            None => {
                self.error(SemanticError::ReturnOutsideFunction, at);
                return;
            }
        };

        context.returned = true;

        let name = context.name.clone();
        let error = match (context.ret, found) {
            (None, _) | (Some(Type::Void), None) => None,
            (Some(Type::Void), Some(_)) => Some((SemanticError::UnexpectedReturnValue(name), at)),
            (Some(ret), None) => Some((SemanticError::MissingReturnValue(name, ret), at)),

            (Some(ret), Some((value_at, Some(found)))) if !ret.accepts(found) => {
                let mismatch = SemanticError::IncompatibleType {
                    expected: ret,
                    found,
                };

                Some((mismatch, value_at))
            }

            (Some(_), Some(_)) => None,
        };

        if let Some((error, at)) = error {
            self.error(error, at);
        }
    }

    fn index(&mut self, index: &Located<Expr>) {
        if let Some(typ) = self.expr(index) {
            if !typ.is_integral() {
                self.error(SemanticError::NonIntegerIndex(typ), index.location());
            }
        }
    }

    /// Infiere el tipo de una expresión.
    fn expr(&mut self, expr: &Located<Expr>) -> Option<Type> {
        let at = expr.location();

        match expr.as_ref() {
            Expr::Literal(literal) => {
                self.visit(1);

                Some(match literal {
                    Literal::Number(text) if text.contains('.') => Type::Double,
                    Literal::Number(_) => Type::Int,
                    Literal::Char(_) => Type::Char,
                    Literal::Bool(_) => Type::Bool,
                })
            }

            Expr::Var(name) => {
                self.visit(1);
                self.variable(name, at, false)
            }

            Expr::Element(name, index) => {
                self.visit(3);
                self.index(index);
                self.variable(name, at, true)
            }

            Expr::Unary(op, operand) => {
                self.visit(1);

                let typ = self.expr(operand)?;
                if !typ.is_numeric() {
                    let error = SemanticError::ArithmeticTypeError(op.to_string(), typ);
                    self.error(error, at);
                    return None;
                }

                match (op, typ) {
                    (UnaryOp::Neg, Type::Double) => Some(Type::Double),
                    _ => Some(Type::Int),
                }
            }

            Expr::Binary(left, op, right) => {
                self.visit(1);

                let left = self.expr(left);
                let right = self.expr(right);
                let (left, right) = (left?, right?);

                let invalid = [left, right].into_iter().find(|typ| {
                    !typ.is_numeric() || (*op == ast::BinOp::Mod && *typ == Type::Double)
                });

                if let Some(invalid) = invalid {
                    let error = SemanticError::ArithmeticTypeError(op.to_string(), invalid);
                    self.error(error, at);
                    return None;
                }

                if op.is_relational() || op.is_logical() {
                    Some(Type::Int)
                } else {
                    left.promote(right)
                }
            }

            Expr::Call(call) => self.call(call, true),
        }
    }

    fn variable(&mut self, name: &Identifier, at: Position, element: bool) -> Option<Type> {
        let exempt = self.assigning.as_ref() == Some(name);

        let (typ, error) = match self.table.lookup_mut(name.as_ref()) {
            None if self.poisoned.contains(name) => (None, None),
            None => (None, Some(SemanticError::UndeclaredIdentifier(name.clone()))),
            Some(symbol) if symbol.is_function() => {
                (None, Some(SemanticError::NotAVariable(name.clone())))
            }

            Some(symbol) => {
                symbol.used = true;

                let error = if element && symbol.length().is_none() {
                    Some(SemanticError::NotAnArray(name.clone()))
                } else if !symbol.initialized && !exempt {
                    Some(SemanticError::UninitializedUse(name.clone()))
                } else {
                    None
                };

                (Some(symbol.typ), error)
            }
        };

        if let Some(error) = error {
            self.error(error, at);
        }

        typ
    }

    /// Verifica una llamada. `value` indica si su resultado se consume.
    fn call(&mut self, call: &ast::Call, value: bool) -> Option<Type> {
        let commas = call.args.len().saturating_sub(1);
        self.visit(3 + commas);

        let args: Vec<_> = call
            .args
            .iter()
            .map(|arg| (arg.location(), self.expr(arg)))
            .collect();

        let (at, name) = (call.callee.location(), call.callee.as_ref());
        let resolved = match self.table.lookup_mut(name.as_ref()) {
            None if self.poisoned.contains(name) => Err(None),
            None => Err(Some(SemanticError::UndeclaredIdentifier(name.clone()))),
            Some(symbol) => match symbol.signature() {
                Some(signature) => {
                    let parameters = signature.parameters.clone();
                    symbol.used = true;
                    Ok((symbol.typ, parameters))
                }

                None => Err(Some(SemanticError::NotAFunction(name.clone()))),
            },
        };

        let (ret, parameters) = match resolved {
            Ok(resolved) => resolved,
            Err(error) => {
                if let Some(error) = error {
                    self.error(error, at);
                }

                return None;
            }
        };

        if args.len() != parameters.len() {
            let mismatch = SemanticError::ArityMismatch {
                name: name.clone(),
                expected: parameters.len(),
                found: args.len(),
            };

            self.error(mismatch, at);
        } else {
            let pairs = args.into_iter().zip(parameters).enumerate();
            for (i, ((arg_at, found), expected)) in pairs {
                match found {
                    Some(found) if !expected.accepts(found) => {
                        let mismatch = SemanticError::ArgumentTypeMismatch {
                            name: name.clone(),
                            position: i + 1,
                            expected,
                            found,
                        };

                        self.error(mismatch, arg_at);
                    }

                    _ => (),
                }
            }
        }

        if value && ret == Type::Void {
            self.error(SemanticError::VoidValueUsed(name.clone()), at);
            return None;
        }

        Some(ret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{build::*, BinOp};

    fn run(statements: Vec<Statement>) -> Diagnostics {
        let mut diagnostics = Diagnostics::new();
        analyze(&program(statements), &mut diagnostics);
        diagnostics
    }

    fn errors(diagnostics: &Diagnostics) -> Vec<&SemanticError> {
        diagnostics.errors().map(|d| d.error.as_ref()).collect()
    }

    fn warnings(diagnostics: &Diagnostics) -> Vec<&SemanticError> {
        diagnostics
            .iter()
            .filter(|d| !d.is_error())
            .map(|d| d.error.as_ref())
            .collect()
    }

    #[test]
    fn block_declarations_vanish_after_close() {
        let diagnostics = run(vec![
            block_stmt(vec![decl("int", "x", Some(num("1")))]),
            assign("x", num("2")),
        ]);

        assert!(matches!(
            errors(&diagnostics)[..],
            [SemanticError::UndeclaredIdentifier(_)]
        ));
    }

    #[test]
    fn outer_variables_are_visible_while_nested() {
        let diagnostics = run(vec![
            decl("int", "x", Some(num("1"))),
            block_stmt(vec![assign("x", bin(var("x"), BinOp::Add, num("1")))]),
        ]);

        assert!(errors(&diagnostics).is_empty());
    }

    #[test]
    fn redeclaration_only_fails_in_the_same_block() {
        let same = run(vec![decl("int", "x", None), decl("int", "x", None)]);
        assert!(matches!(
            errors(&same)[..],
            [SemanticError::DoubleDeclaration(_)]
        ));

        let nested = run(vec![
            decl("int", "x", None),
            block_stmt(vec![decl("int", "x", None)]),
        ]);

        assert!(errors(&nested).is_empty());
    }

    #[test]
    fn arithmetic_promotes_and_assignment_narrows() {
        let accepted = run(vec![
            decl("double", "d", Some(bin(num("1"), BinOp::Add, num("2.0")))),
            decl("int", "i", Some(bin(chr('a'), BinOp::Add, num("1")))),
            decl("double", "e", Some(var("i"))),
        ]);

        assert!(errors(&accepted).is_empty());

        let rejected = run(vec![
            decl("int", "i", Some(bin(num("1"), BinOp::Add, num("2.0")))),
            decl("char", "c", Some(bin(chr('a'), BinOp::Add, num("1")))),
        ]);

        assert!(matches!(
            errors(&rejected)[..],
            [
                SemanticError::IncompatibleType {
                    expected: Type::Int,
                    found: Type::Double
                },
                SemanticError::IncompatibleType {
                    expected: Type::Char,
                    found: Type::Int
                },
            ]
        ));
    }

    #[test]
    fn modulo_rejects_doubles() {
        let diagnostics = run(vec![decl(
            "double",
            "d",
            Some(bin(num("5.0"), BinOp::Mod, num("2"))),
        )]);

        assert!(matches!(
            errors(&diagnostics)[..],
            [SemanticError::ArithmeticTypeError(_, Type::Double)]
        ));
    }

    #[test]
    fn calls_are_checked_against_the_signature() {
        let diagnostics = run(vec![
            prototype("int", "f", vec![param("int", "a")]),
            decl("int", "y", Some(call("f", vec![num("1"), num("2")]))),
            call_stmt("g", vec![num("1")]),
            decl("int", "z", Some(call("f", vec![num("1.5")]))),
        ]);

        assert!(matches!(
            errors(&diagnostics)[..],
            [
                SemanticError::ArityMismatch {
                    expected: 1,
                    found: 2,
                    ..
                },
                SemanticError::UndeclaredIdentifier(_),
                SemanticError::ArgumentTypeMismatch { position: 1, .. },
            ]
        ));

        assert!(warnings(&diagnostics)
            .iter()
            .any(|w| matches!(w, SemanticError::UndefinedFunction(_))));
    }

    #[test]
    fn void_results_cannot_be_used_as_values() {
        let diagnostics = run(vec![
            function("void", "p", vec![], vec![]),
            call_stmt("p", vec![]),
            decl("int", "x", Some(call("p", vec![]))),
        ]);

        assert!(matches!(
            errors(&diagnostics)[..],
            [SemanticError::VoidValueUsed(_)]
        ));
    }

    #[test]
    fn locals_must_be_initialized_before_use() {
        let diagnostics = run(vec![function(
            "int",
            "f",
            vec![],
            vec![
                decl("int", "x", None),
                decl("int", "y", Some(var("x"))),
                ret(Some(var("y"))),
            ],
        )]);

        assert!(matches!(
            errors(&diagnostics)[..],
            [SemanticError::UninitializedUse(_)]
        ));
    }

    #[test]
    fn self_assignment_is_not_an_uninitialized_use() {
        let diagnostics = run(vec![function(
            "int",
            "f",
            vec![],
            vec![
                decl("int", "x", None),
                assign("x", bin(var("x"), BinOp::Add, num("1"))),
                ret(Some(var("x"))),
            ],
        )]);

        assert!(errors(&diagnostics).is_empty());
    }

    #[test]
    fn loop_control_requires_a_loop() {
        let outside = run(vec![brk(), cont()]);
        assert!(matches!(
            errors(&outside)[..],
            [
                SemanticError::BreakOutsideLoop,
                SemanticError::ContinueOutsideLoop
            ]
        ));

        let inside = run(vec![while_(boolean(true), vec![brk(), cont()])]);
        assert!(errors(&inside).is_empty());
    }

    #[test]
    fn returns_are_checked_against_the_function() {
        let diagnostics = run(vec![
            function("int", "f", vec![], vec![decl("int", "x", Some(num("1")))]),
            function("void", "g", vec![], vec![ret(Some(num("1")))]),
            function("int", "h", vec![], vec![ret(None)]),
            ret(Some(num("0"))),
        ]);

        assert!(matches!(
            errors(&diagnostics)[..],
            [
                SemanticError::MissingReturn(_, Type::Int),
                SemanticError::UnexpectedReturnValue(_),
                SemanticError::MissingReturnValue(_, Type::Int),
                SemanticError::ReturnOutsideFunction,
            ]
        ));
    }

    #[test]
    fn recursion_resolves_through_the_global_scope() {
        let body = vec![
            if_(
                bin(var("n"), BinOp::Less, num("1")),
                vec![ret(Some(num("0")))],
                None,
            ),
            ret(Some(call("f", vec![bin(var("n"), BinOp::Sub, num("1"))]))),
        ];

        let diagnostics = run(vec![function("int", "f", vec![param("int", "n")], body)]);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn definitions_must_match_their_prototype() {
        let diagnostics = run(vec![
            prototype("int", "f", vec![anonymous("int")]),
            function("int", "f", vec![param("double", "x")], vec![ret(Some(num("1")))]),
            function("int", "g", vec![], vec![ret(Some(num("1")))]),
            function("int", "g", vec![], vec![ret(Some(num("2")))]),
        ]);

        assert!(matches!(
            errors(&diagnostics)[..],
            [
                SemanticError::IncompatibleSignature(_),
                SemanticError::FunctionRedefinition(_),
            ]
        ));
    }

    #[test]
    fn parameters_share_the_body_scope() {
        let diagnostics = run(vec![function(
            "int",
            "f",
            vec![param("int", "a")],
            vec![decl("int", "a", Some(num("1"))), ret(Some(var("a")))],
        )]);

        assert!(matches!(
            errors(&diagnostics)[..],
            [SemanticError::DoubleDeclaration(_)]
        ));
    }

    #[test]
    fn unknown_types_do_not_cascade() {
        let diagnostics = run(vec![
            decl("string", "s", Some(num("1"))),
            assign("s", num("2")),
            decl("int", "n", Some(bin(var("s"), BinOp::Add, num("1")))),
        ]);

        assert!(matches!(
            errors(&diagnostics)[..],
            [SemanticError::UnknownType(_)]
        ));
    }

    #[test]
    fn arrays_need_integral_indices() {
        let diagnostics = run(vec![
            array("int", "v", 3),
            assign_elem("v", num("1.5"), num("2")),
            decl("int", "x", Some(num("1"))),
            assign_elem("x", num("0"), num("2")),
            decl("int", "y", Some(elem("v", chr('a')))),
        ]);

        assert!(matches!(
            errors(&diagnostics)[..],
            [
                SemanticError::NonIntegerIndex(Type::Double),
                SemanticError::NotAnArray(_),
            ]
        ));
    }

    #[test]
    fn for_headers_live_in_the_loop_scope() {
        let diagnostics = run(vec![
            for_(
                Some(decl("int", "i", Some(num("0")))),
                bin(var("i"), BinOp::Less, num("5")),
                Some(assign("i", bin(var("i"), BinOp::Add, num("1")))),
                vec![brk()],
            ),
            assign("i", num("0")),
        ]);

        assert!(matches!(
            errors(&diagnostics)[..],
            [SemanticError::UndeclaredIdentifier(_)]
        ));
    }

    fn declared_on(line: u32, name: &str) -> Statement {
        let mut statement = decl("int", name, Some(num("1")));
        if let StatementKind::Declaration(declaration) = &mut statement.kind {
            declaration.name = located(line, 5, Identifier::from(name));
        }

        statement
    }

    #[test]
    fn unused_variables_are_reported_in_order() {
        let diagnostics = run(vec![function(
            "void",
            "f",
            vec![param("int", "unused_parameter")],
            vec![
                declared_on(3, "b"),
                declared_on(2, "a"),
            ],
        )]);

        let lines: Vec<_> = diagnostics
            .iter()
            .filter(|d| matches!(d.error.as_ref(), SemanticError::UnusedVariable(_)))
            .map(|d| d.line())
            .collect();

        assert!(errors(&diagnostics).is_empty());
        assert_eq!(lines, [2, 3]);
    }

    #[test]
    fn missing_terminators_are_syntax_errors() {
        let diagnostics = run(vec![
            decl("int", "x", Some(num("1"))).unterminated(),
            Statement {
                kind: StatementKind::Block(open_block(vec![])),
                location: Position::default(),
                terminated: true,
            },
            function("void", "f", vec![], vec![ret(None).unterminated()]),
        ]);

        assert!(matches!(
            errors(&diagnostics)[..],
            [
                SemanticError::MissingToken(";"),
                SemanticError::MissingToken("}"),
                SemanticError::MissingToken(";"),
            ]
        ));
    }

    #[test]
    fn statistics_count_nodes_and_tokens() {
        let mut diagnostics = Diagnostics::new();
        let statistics = analyze(
            &program(vec![decl("int", "x", Some(num("1")))]),
            &mut diagnostics,
        );

        assert_eq!(
            statistics,
            Statistics {
                nodes: 3,
                tokens: 5
            }
        );
    }

    #[test]
    fn calling_a_variable_is_rejected() {
        let diagnostics = run(vec![
            decl("int", "x", Some(num("1"))),
            call_stmt("x", vec![]),
        ]);

        assert!(matches!(
            errors(&diagnostics)[..],
            [SemanticError::NotAFunction(_)]
        ));
    }

    #[test]
    fn functions_are_not_variables() {
        let diagnostics = run(vec![
            function("int", "f", vec![], vec![ret(Some(num("1")))]),
            assign("f", num("2")),
            decl("int", "y", Some(var("f"))),
        ]);

        assert!(matches!(
            errors(&diagnostics)[..],
            [
                SemanticError::NotAVariable(_),
                SemanticError::NotAVariable(_)
            ]
        ));
    }

    #[test]
    fn void_variables_are_rejected() {
        let diagnostics = run(vec![decl("void", "x", None)]);

        assert!(matches!(
            errors(&diagnostics)[..],
            [SemanticError::VoidVariable(_)]
        ));
    }

    #[test]
    fn assignments_do_not_narrow_doubles() {
        let diagnostics = run(vec![
            decl("int", "i", Some(num("0"))),
            assign("i", num("2.5")),
        ]);

        assert!(matches!(
            errors(&diagnostics)[..],
            [SemanticError::IncompatibleType {
                expected: Type::Int,
                found: Type::Double
            }]
        ));
    }
}
