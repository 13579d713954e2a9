//! Árbol sintáctico de entrada.
//!
//! El análisis léxico y sintáctico ocurre fuera de este crate. Cualquier
//! front end que produzca esta misma taxonomía de nodos es un sustituto
//! válido. Los tipos declarados se conservan como el texto original del
//! token, ya que resolverlos (y reportar `UnknownType`) es trabajo del
//! análisis semántico.

use std::{
    borrow::Borrow,
    fmt::{self, Display},
    rc::Rc,
};

use crate::source::{Located, Position};

pub mod build;

/// Un identificador.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(Rc<str>);

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Identifier {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Identifier {
    fn from(name: &str) -> Self {
        Identifier(Rc::from(name))
    }
}

impl Display for Identifier {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(&self.0)
    }
}

/// Unidad de traducción completa.
#[derive(Debug, Clone)]
pub struct Program {
    pub statements: Vec<Statement>,
    pub end: Position,
}

#[derive(Debug, Clone)]
pub struct Statement {
    pub kind: StatementKind,
    pub location: Position,

    /// `false` si el front end aceptó la sentencia sin su `;`.
    pub terminated: bool,
}

#[derive(Debug, Clone)]
pub enum StatementKind {
    Declaration(Declaration),
    Prototype(Prototype),
    Function(Function),
    Assignment(Assignment),
    Call(Call),
    Block(Block),

    If {
        condition: Located<Expr>,
        then: Block,
        otherwise: Option<Block>,
    },

    While {
        condition: Located<Expr>,
        body: Block,
    },

    For {
        init: Option<Box<Statement>>,
        condition: Located<Expr>,
        update: Option<Box<Statement>>,
        body: Block,
    },

    Break,
    Continue,
    Return(Option<Located<Expr>>),
}

impl StatementKind {
    /// Indica si la gramática exige `;` al final de esta sentencia.
    pub fn needs_terminator(&self) -> bool {
        matches!(
            self,
            StatementKind::Declaration(_)
                | StatementKind::Prototype(_)
                | StatementKind::Assignment(_)
                | StatementKind::Call(_)
                | StatementKind::Break
                | StatementKind::Continue
                | StatementKind::Return(_)
        )
    }
}

/// Secuencia de sentencias entre llaves.
#[derive(Debug, Clone)]
pub struct Block {
    pub statements: Vec<Statement>,
    pub open: Position,

    /// Ubicación de `}`, o `None` si no se encontró.
    pub close: Option<Position>,
}

#[derive(Debug, Clone)]
pub struct Declaration {
    pub typ: Located<String>,
    pub name: Located<Identifier>,
    pub length: Option<Located<u32>>,
    pub init: Option<Located<Expr>>,
}

#[derive(Debug, Clone)]
pub struct Parameter {
    pub typ: Located<String>,
    pub name: Option<Located<Identifier>>,
}

#[derive(Debug, Clone)]
pub struct Prototype {
    pub ret: Located<String>,
    pub name: Located<Identifier>,
    pub parameters: Vec<Parameter>,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub ret: Located<String>,
    pub name: Located<Identifier>,
    pub parameters: Vec<Parameter>,
    pub body: Block,
}

#[derive(Debug, Clone)]
pub struct Assignment {
    pub target: Target,
    pub value: Located<Expr>,
}

/// Destino de una asignación: una variable o un elemento de arreglo.
#[derive(Debug, Clone)]
pub struct Target {
    pub name: Located<Identifier>,
    pub index: Option<Box<Located<Expr>>>,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub callee: Located<Identifier>,
    pub args: Vec<Located<Expr>>,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Literal),
    Var(Identifier),
    Element(Identifier, Box<Located<Expr>>),
    Unary(UnaryOp, Box<Located<Expr>>),
    Binary(Box<Located<Expr>>, BinOp, Box<Located<Expr>>),
    Call(Call),
}

/// Constantes literales, con su lexema original.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// `42`, `3.14`. Un `.` en el lexema la vuelve de punto flotante.
    Number(String),

    /// `'a'`, `'\n'`, con comillas incluidas.
    Char(String),

    Bool(bool),
}

impl Literal {
    /// Texto que representa al literal en código intermedio.
    pub fn text(&self) -> String {
        match self {
            Literal::Number(text) | Literal::Char(text) => text.clone(),
            Literal::Bool(true) => String::from("true"),
            Literal::Bool(false) => String::from("false"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    And,
    Or,
}

impl BinOp {
    /// Operadores cuyo resultado es un valor de verdad.
    pub fn is_relational(self) -> bool {
        use BinOp::*;

        matches!(
            self,
            Equal | NotEqual | Less | LessOrEqual | Greater | GreaterOrEqual
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }
}

impl Display for UnaryOp {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Neg => fmt.write_str("-"),
            UnaryOp::Not => fmt.write_str("!"),
        }
    }
}

impl Display for BinOp {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use BinOp::*;

        let symbol = match self {
            Add => "+",
            Sub => "-",
            Mul => "*",
            Div => "/",
            Mod => "%",
            Equal => "==",
            NotEqual => "!=",
            Less => "<",
            LessOrEqual => "<=",
            Greater => ">",
            GreaterOrEqual => ">=",
            And => "&&",
            Or => "||",
        };

        fmt.write_str(symbol)
    }
}
