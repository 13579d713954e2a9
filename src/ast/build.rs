//! Constructores compactos de nodos.
//!
//! Pensados para adaptadores de front end y para pruebas. Todos los nodos
//! se ubican en la posición por omisión; [`Statement::at()`] y
//! [`located()`] permiten reubicarlos cuando la posición importa.

use super::*;

pub fn located<T>(line: u32, column: u32, value: T) -> Located<T> {
    Located::at(value, Position::new(line, column))
}

fn here<T>(value: T) -> Located<T> {
    Located::at(value, Position::default())
}

fn id(name: &str) -> Located<Identifier> {
    here(Identifier::from(name))
}

fn statement(kind: StatementKind) -> Statement {
    Statement {
        kind,
        location: Position::default(),
        terminated: true,
    }
}

impl Statement {
    /// Reubica la sentencia.
    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.location = Position::new(line, column);
        self
    }

    /// Marca la sentencia como carente de `;`.
    pub fn unterminated(mut self) -> Self {
        self.terminated = false;
        self
    }
}

pub fn num(text: &str) -> Located<Expr> {
    here(Expr::Literal(Literal::Number(text.to_owned())))
}

pub fn chr(c: char) -> Located<Expr> {
    here(Expr::Literal(Literal::Char(format!("'{}'", c))))
}

pub fn boolean(value: bool) -> Located<Expr> {
    here(Expr::Literal(Literal::Bool(value)))
}

pub fn var(name: &str) -> Located<Expr> {
    here(Expr::Var(Identifier::from(name)))
}

pub fn elem(name: &str, index: Located<Expr>) -> Located<Expr> {
    here(Expr::Element(Identifier::from(name), Box::new(index)))
}

pub fn neg(operand: Located<Expr>) -> Located<Expr> {
    here(Expr::Unary(UnaryOp::Neg, Box::new(operand)))
}

pub fn not(operand: Located<Expr>) -> Located<Expr> {
    here(Expr::Unary(UnaryOp::Not, Box::new(operand)))
}

pub fn bin(left: Located<Expr>, op: BinOp, right: Located<Expr>) -> Located<Expr> {
    here(Expr::Binary(Box::new(left), op, Box::new(right)))
}

pub fn call(name: &str, args: Vec<Located<Expr>>) -> Located<Expr> {
    here(Expr::Call(Call {
        callee: id(name),
        args,
    }))
}

pub fn call_stmt(name: &str, args: Vec<Located<Expr>>) -> Statement {
    statement(StatementKind::Call(Call {
        callee: id(name),
        args,
    }))
}

pub fn decl(typ: &str, name: &str, init: Option<Located<Expr>>) -> Statement {
    statement(StatementKind::Declaration(Declaration {
        typ: here(typ.to_owned()),
        name: id(name),
        length: None,
        init,
    }))
}

pub fn array(typ: &str, name: &str, length: u32) -> Statement {
    statement(StatementKind::Declaration(Declaration {
        typ: here(typ.to_owned()),
        name: id(name),
        length: Some(here(length)),
        init: None,
    }))
}

pub fn assign(name: &str, value: Located<Expr>) -> Statement {
    statement(StatementKind::Assignment(Assignment {
        target: Target {
            name: id(name),
            index: None,
        },
        value,
    }))
}

pub fn assign_elem(name: &str, index: Located<Expr>, value: Located<Expr>) -> Statement {
    statement(StatementKind::Assignment(Assignment {
        target: Target {
            name: id(name),
            index: Some(Box::new(index)),
        },
        value,
    }))
}

pub fn block(statements: Vec<Statement>) -> Block {
    Block {
        statements,
        open: Position::default(),
        close: Some(Position::default()),
    }
}

/// Bloque al que le falta su `}`.
pub fn open_block(statements: Vec<Statement>) -> Block {
    Block {
        close: None,
        ..block(statements)
    }
}

pub fn block_stmt(statements: Vec<Statement>) -> Statement {
    statement(StatementKind::Block(block(statements)))
}

pub fn if_(
    condition: Located<Expr>,
    then: Vec<Statement>,
    otherwise: Option<Vec<Statement>>,
) -> Statement {
    statement(StatementKind::If {
        condition,
        then: block(then),
        otherwise: otherwise.map(block),
    })
}

pub fn while_(condition: Located<Expr>, body: Vec<Statement>) -> Statement {
    statement(StatementKind::While {
        condition,
        body: block(body),
    })
}

pub fn for_(
    init: Option<Statement>,
    condition: Located<Expr>,
    update: Option<Statement>,
    body: Vec<Statement>,
) -> Statement {
    statement(StatementKind::For {
        init: init.map(Box::new),
        condition,
        update: update.map(Box::new),
        body: block(body),
    })
}

pub fn brk() -> Statement {
    statement(StatementKind::Break)
}

pub fn cont() -> Statement {
    statement(StatementKind::Continue)
}

pub fn ret(value: Option<Located<Expr>>) -> Statement {
    statement(StatementKind::Return(value))
}

pub fn param(typ: &str, name: &str) -> Parameter {
    Parameter {
        typ: here(typ.to_owned()),
        name: Some(id(name)),
    }
}

/// Parámetro sin nombre, como en `int f(int);`.
pub fn anonymous(typ: &str) -> Parameter {
    Parameter {
        typ: here(typ.to_owned()),
        name: None,
    }
}

pub fn function(
    ret: &str,
    name: &str,
    parameters: Vec<Parameter>,
    body: Vec<Statement>,
) -> Statement {
    statement(StatementKind::Function(Function {
        ret: here(ret.to_owned()),
        name: id(name),
        parameters,
        body: block(body),
    }))
}

pub fn prototype(ret: &str, name: &str, parameters: Vec<Parameter>) -> Statement {
    statement(StatementKind::Prototype(Prototype {
        ret: here(ret.to_owned()),
        name: id(name),
        parameters,
    }))
}

pub fn program(statements: Vec<Statement>) -> Program {
    Program {
        statements,
        end: Position::default(),
    }
}
