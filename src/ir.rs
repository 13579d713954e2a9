//! Representación intermedia de tres direcciones.
//!
//! Cada instrucción tiene a lo sumo dos operandos fuente y un destino.
//! Los temporales (`t<N>`) y las etiquetas (`l<N>`) provienen de
//! contadores monotónicos en [`Names`], por lo cual nunca se reutilizan
//! dentro de un mismo programa.

use std::{
    collections::BTreeMap,
    fmt::{self, Display},
};

use crate::{
    ast::{BinOp, Identifier, UnaryOp},
    types::Type,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Temp(pub u32);

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Operand {
    /// Texto literal, tal como aparece en el código fuente.
    Const(String),

    Var(Identifier),
    Temp(Temp),

    Element {
        array: Identifier,
        index: Box<Operand>,
    },
}

impl Operand {
    pub fn is_const(&self) -> bool {
        matches!(self, Operand::Const(_))
    }

    /// Indica si este operando es un nombre al que se le puede dar
    /// seguimiento en análisis de flujo de datos.
    pub fn is_name(&self) -> bool {
        matches!(self, Operand::Var(_) | Operand::Temp(_))
    }

    /// Visita cada nombre que se lee al evaluar este operando.
    pub fn for_each_name<F>(&self, visit: &mut F)
    where
        F: FnMut(&Operand),
    {
        match self {
            Operand::Const(_) => (),
            Operand::Var(_) | Operand::Temp(_) => visit(self),
            Operand::Element { array, index } => {
                visit(&Operand::Var(array.clone()));
                index.for_each_name(visit);
            }
        }
    }

    /// Indica si `name` participa en este operando.
    pub fn mentions(&self, name: &Operand) -> bool {
        let mut found = false;
        self.for_each_name(&mut |operand| found |= operand == name);
        found
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    /// Inicio de una función.
    Function {
        name: Identifier,
        params: Vec<Identifier>,
    },

    Label(Label),
    Goto(Label),

    /// Salta a `target` si `condition` es verdadera.
    If {
        condition: Operand,
        target: Label,
    },

    Copy {
        source: Operand,
        result: Operand,
    },

    Unary {
        op: UnaryOp,
        operand: Operand,
        result: Operand,
    },

    Binary {
        op: BinOp,
        left: Operand,
        right: Operand,
        result: Operand,
    },

    Call {
        function: Identifier,
        args: Vec<Operand>,
        result: Temp,
    },

    Return(Option<Operand>),
}

impl Instruction {
    /// Destino escrito por esta instrucción, si lo hay.
    pub fn result(&self) -> Option<&Operand> {
        match self {
            Instruction::Copy { result, .. }
            | Instruction::Unary { result, .. }
            | Instruction::Binary { result, .. } => Some(result),

            _ => None,
        }
    }

    /// Indica si la instrucción delimita un bloque básico.
    pub fn is_boundary(&self) -> bool {
        matches!(
            self,
            Instruction::Function { .. }
                | Instruction::Label(_)
                | Instruction::Goto(_)
                | Instruction::If { .. }
        )
    }
}

/// Contadores de temporales y etiquetas.
#[derive(Default)]
pub struct Names {
    temps: u32,
    labels: u32,
}

impl Names {
    pub fn temp(&mut self) -> Temp {
        let temp = Temp(self.temps);
        self.temps += 1;
        temp
    }

    pub fn label(&mut self) -> Label {
        let label = Label(self.labels);
        self.labels += 1;
        label
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Program {
    /// Variables declaradas fuera de toda función.
    pub globals: Vec<Identifier>,

    /// Tipo declarado de cada variable, por su nombre en este código.
    ///
    /// Una declaración que sombrea a otra recibe un nombre propio, como
    /// `x.1`, así que cada nombre tiene un único tipo.
    pub variables: BTreeMap<Identifier, Type>,

    /// Código de nivel superior, seguido por cada función.
    pub code: Vec<Instruction>,
}

impl Display for Label {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "l{}", self.0)
    }
}

impl Display for Temp {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "t{}", self.0)
    }
}

impl Display for Operand {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Const(text) => fmt.write_str(text),
            Operand::Var(name) => write!(fmt, "{}", name),
            Operand::Temp(temp) => write!(fmt, "{}", temp),
            Operand::Element { array, index } => write!(fmt, "{}[{}]", array, index),
        }
    }
}

impl Display for Instruction {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Function { name, params } => {
                write!(fmt, "function {}(", name)?;
                for (i, param) in params.iter().enumerate() {
                    let separator = if i > 0 { ", " } else { "" };
                    write!(fmt, "{}{}", separator, param)?;
                }

                write!(fmt, "):")
            }

            Instruction::Label(label) => write!(fmt, "{}:", label),
            Instruction::Goto(label) => write!(fmt, "goto {}", label),
            Instruction::If { condition, target } => write!(fmt, "if {} goto {}", condition, target),
            Instruction::Copy { source, result } => write!(fmt, "{} = {}", result, source),

            Instruction::Unary {
                op,
                operand,
                result,
            } => write!(fmt, "{} = {} {}", result, op, operand),

            Instruction::Binary {
                op,
                left,
                right,
                result,
            } => write!(fmt, "{} = {} {} {}", result, left, op, right),

            Instruction::Call {
                function,
                args,
                result,
            } => {
                let args: Vec<_> = args.iter().map(Operand::to_string).collect();
                write!(fmt, "{} = call {}({})", result, function, args.join(","))
            }

            Instruction::Return(Some(value)) => write!(fmt, "return {}", value),
            Instruction::Return(None) => fmt.write_str("return"),
        }
    }
}

impl Display for Program {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        for instruction in &self.code {
            writeln!(fmt, "{}", instruction)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Operand {
        Operand::Var(Identifier::from(name))
    }

    #[test]
    fn instructions_render_as_three_address_text() {
        let code = [
            Instruction::Function {
                name: Identifier::from("f"),
                params: vec![Identifier::from("a"), Identifier::from("b")],
            },
            Instruction::Label(Label(2)),
            Instruction::Goto(Label(2)),
            Instruction::If {
                condition: Operand::Temp(Temp(0)),
                target: Label(1),
            },
            Instruction::Copy {
                source: Operand::Const(String::from("5")),
                result: var("x"),
            },
            Instruction::Unary {
                op: UnaryOp::Neg,
                operand: var("x"),
                result: Operand::Temp(Temp(1)),
            },
            Instruction::Binary {
                op: BinOp::LessOrEqual,
                left: var("a"),
                right: Operand::Const(String::from("2.5")),
                result: Operand::Temp(Temp(2)),
            },
            Instruction::Call {
                function: Identifier::from("g"),
                args: vec![var("a"), Operand::Temp(Temp(2))],
                result: Temp(3),
            },
            Instruction::Return(Some(var("x"))),
            Instruction::Return(None),
        ];

        let text: Vec<_> = code.iter().map(Instruction::to_string).collect();
        assert_eq!(
            text,
            [
                "function f(a, b):",
                "l2:",
                "goto l2",
                "if t0 goto l1",
                "x = 5",
                "t1 = - x",
                "t2 = a <= 2.5",
                "t3 = call g(a,t2)",
                "return x",
                "return",
            ]
        );
    }

    #[test]
    fn elements_read_both_array_and_index() {
        let element = Operand::Element {
            array: Identifier::from("v"),
            index: Box::new(Operand::Temp(Temp(4))),
        };

        assert_eq!(element.to_string(), "v[t4]");

        let mut names = Vec::new();
        element.for_each_name(&mut |name| names.push(name.to_string()));
        assert_eq!(names, ["v", "t4"]);

        assert!(element.mentions(&Operand::Temp(Temp(4))));
        assert!(!element.mentions(&var("t4")));
    }

    #[test]
    fn names_never_repeat() {
        let mut names = Names::default();
        assert_eq!(names.temp(), Temp(0));
        assert_eq!(names.temp(), Temp(1));
        assert_eq!(names.label(), Label(0));
        assert_eq!(names.temp(), Temp(2));
        assert_eq!(names.label(), Label(1));
    }
}
