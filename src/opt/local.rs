//! Optimizaciones locales a cada bloque básico.
//!
//! Se mantiene un mapa de constantes conocidas y un mapa de expresiones
//! ya calculadas. Ambos se descartan al cruzar una etiqueta, un salto o
//! el inicio de una función, ya que a partir de ese punto el flujo de
//! control puede provenir de otro lado.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::{
    ast::{BinOp, Identifier, UnaryOp},
    ir::{Instruction, Operand},
    types::Type,
};

type Variables = BTreeMap<Identifier, Type>;

/// Una expresión pura, clave de eliminación de subexpresiones comunes.
#[derive(Clone, PartialEq, Eq, Hash)]
enum Key {
    Unary(UnaryOp, Operand),
    Binary(BinOp, Operand, Operand),
}

impl Key {
    fn mentions(&self, name: &Operand) -> bool {
        match self {
            Key::Unary(_, operand) => operand.mentions(name),
            Key::Binary(_, left, right) => left.mentions(name) || right.mentions(name),
        }
    }

    fn mentions_array(&self, array: &Operand) -> bool {
        let touches = |operand: &Operand| match operand {
            Operand::Element { .. } => operand.mentions(array),
            _ => false,
        };

        match self {
            Key::Unary(_, operand) => touches(operand),
            Key::Binary(_, left, right) => touches(left) || touches(right),
        }
    }
}

#[derive(Default)]
struct Facts {
    constants: HashMap<Operand, String>,
    expressions: HashMap<Key, Operand>,
}

impl Facts {
    fn reset(&mut self) {
        self.constants.clear();
        self.expressions.clear();
    }

    fn substitute(&self, operand: &Operand) -> Operand {
        match operand {
            Operand::Var(_) | Operand::Temp(_) => match self.constants.get(operand) {
                Some(value) => Operand::Const(value.clone()),
                None => operand.clone(),
            },

            Operand::Element { array, index } => Operand::Element {
                array: array.clone(),
                index: Box::new(self.substitute(index)),
            },

            Operand::Const(_) => operand.clone(),
        }
    }

    /// Olvida todo lo que dependa del valor anterior de `name`.
    fn invalidate(&mut self, name: &Operand) {
        self.constants.remove(name);
        self.expressions
            .retain(|key, holder| holder != name && !key.mentions(name));
    }

    /// Una escritura a un elemento invalida toda lectura del arreglo.
    fn invalidate_array(&mut self, array: &Operand) {
        self.expressions
            .retain(|key, _| !key.mentions_array(array));
    }

    /// Tras una llamada, cualquier global pudo haber cambiado.
    fn invalidate_globals(&mut self, globals: &HashSet<Operand>) {
        for global in globals {
            self.invalidate(global);
            self.invalidate_array(global);
        }
    }

    /// Olvida lo que dependa de un destino a punto de escribirse.
    fn clobber(&mut self, result: &Operand) {
        match result {
            Operand::Element { array, .. } => {
                self.invalidate_array(&Operand::Var(array.clone()));
            }

            _ => self.invalidate(result),
        }
    }

    /// Registra la escritura de `result` con el valor de `source`.
    fn define(&mut self, result: &Operand, source: &Operand) {
        self.clobber(result);
        if let (true, Operand::Const(value)) = (result.is_name(), source) {
            self.constants.insert(result.clone(), value.clone());
        }
    }

    fn rewrite(
        &mut self,
        instruction: &Instruction,
        globals: &HashSet<Operand>,
        variables: &Variables,
    ) -> Instruction {
        match instruction {
            Instruction::Function { .. } | Instruction::Label(_) | Instruction::Goto(_) => {
                self.reset();
                instruction.clone()
            }

            Instruction::If { condition, target } => {
                let condition = self.substitute(condition);
                self.reset();

                Instruction::If {
                    condition,
                    target: *target,
                }
            }

            Instruction::Return(value) => {
                Instruction::Return(value.as_ref().map(|value| self.substitute(value)))
            }

            Instruction::Copy { source, result } => {
                let source = coerce(self.substitute(source), result, variables);
                let result = self.substitute_target(result);
                self.copy(source, result)
            }

            Instruction::Unary {
                op,
                operand,
                result,
            } => {
                let operand = self.substitute(operand);
                if let Operand::Const(value) = &operand {
                    if let Some(folded) = fold_unary(*op, value) {
                        return self.copy(Operand::Const(folded), result.clone());
                    }
                }

                self.compute(Key::Unary(*op, operand), result)
            }

            Instruction::Binary {
                op,
                left,
                right,
                result,
            } => {
                let left = self.substitute(left);
                let right = self.substitute(right);

                if let (Operand::Const(a), Operand::Const(b)) = (&left, &right) {
                    if let Some(folded) = fold_binary(*op, a, b) {
                        return self.copy(Operand::Const(folded), result.clone());
                    }
                }

                self.compute(Key::Binary(*op, left, right), result)
            }

            Instruction::Call {
                function,
                args,
                result,
            } => {
                let args = args.iter().map(|arg| self.substitute(arg)).collect();

                self.invalidate(&Operand::Temp(*result));
                self.invalidate_globals(globals);

                Instruction::Call {
                    function: function.clone(),
                    args,
                    result: *result,
                }
            }
        }
    }

    /// Los índices de un destino se leen, sus nombres no.
    fn substitute_target(&self, result: &Operand) -> Operand {
        match result {
            Operand::Element { .. } => self.substitute(result),
            _ => result.clone(),
        }
    }

    fn copy(&mut self, source: Operand, result: Operand) -> Instruction {
        self.define(&result, &source);
        Instruction::Copy { source, result }
    }

    fn compute(&mut self, key: Key, result: &Operand) -> Instruction {
        if let Some(holder) = self.expressions.get(&key) {
            let source = holder.clone();
            return self.copy(source, result.clone());
        }

        self.clobber(result);
        if result.is_name() && !key.mentions(result) {
            self.expressions.insert(key.clone(), result.clone());
        }

        match key {
            Key::Unary(op, operand) => Instruction::Unary {
                op,
                operand,
                result: result.clone(),
            },

            Key::Binary(op, left, right) => Instruction::Binary {
                op,
                left,
                right,
                result: result.clone(),
            },
        }
    }
}

/// Ajusta una constante al tipo de la variable que la recibe: un
/// `double` conserva el punto decimal y un `bool` queda en 0 o 1.
fn coerce(source: Operand, result: &Operand, variables: &Variables) -> Operand {
    let (value, name) = match (&source, result) {
        (Operand::Const(value), Operand::Var(name)) => (value, name),
        _ => return source,
    };

    let number = match Number::parse(value) {
        Some(number) => number,
        None => return source,
    };

    let coerced = match variables.get(name) {
        Some(Type::Double) => Number::Float(number.as_float()),
        Some(Type::Bool) => truth(number.is_true()),
        _ => return source,
    };

    coerced.render().map(Operand::Const).unwrap_or(source)
}

/// Aplica una pasada local. Retorna `true` si hubo cambios.
pub fn fold(code: &mut [Instruction], globals: &HashSet<Operand>, variables: &Variables) -> bool {
    let mut facts = Facts::default();
    let mut changed = false;

    for instruction in code.iter_mut() {
        let rewritten = facts.rewrite(instruction, globals, variables);
        if rewritten != *instruction {
            log::trace!("rewrite `{}` => `{}`", instruction, rewritten);

            *instruction = rewritten;
            changed = true;
        }
    }

    changed
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum Number {
    Int(i32),
    Float(f64),
}

impl Number {
    fn parse(text: &str) -> Option<Number> {
        if text.contains('.') {
            text.parse().ok().map(Number::Float)
        } else {
            text.parse().ok().map(Number::Int)
        }
    }

    fn as_float(self) -> f64 {
        match self {
            Number::Int(value) => value as f64,
            Number::Float(value) => value,
        }
    }

    fn is_true(self) -> bool {
        match self {
            Number::Int(value) => value != 0,
            Number::Float(value) => value != 0.0,
        }
    }

    fn render(self) -> Option<String> {
        match self {
            Number::Int(value) => Some(value.to_string()),
            Number::Float(value) if value.is_finite() => {
                let text = value.to_string();
                Some(if text.contains('.') {
                    text
                } else {
                    format!("{}.0", text)
                })
            }

            Number::Float(_) => None,
        }
    }
}

fn truth(value: bool) -> Number {
    Number::Int(value as i32)
}

fn fold_unary(op: UnaryOp, operand: &str) -> Option<String> {
    let operand = Number::parse(operand)?;
    let result = match (op, operand) {
        (UnaryOp::Neg, Number::Int(value)) => Number::Int(value.checked_neg()?),
        (UnaryOp::Neg, Number::Float(value)) => Number::Float(-value),
        (UnaryOp::Not, operand) => truth(!operand.is_true()),
    };

    result.render()
}

fn fold_binary(op: BinOp, left: &str, right: &str) -> Option<String> {
    use BinOp::*;

    let (left, right) = (Number::parse(left)?, Number::parse(right)?);
    let result = match (op, left, right) {
        (And, a, b) => truth(a.is_true() && b.is_true()),
        (Or, a, b) => truth(a.is_true() || b.is_true()),

        (Add, Number::Int(a), Number::Int(b)) => Number::Int(a.checked_add(b)?),
        (Sub, Number::Int(a), Number::Int(b)) => Number::Int(a.checked_sub(b)?),
        (Mul, Number::Int(a), Number::Int(b)) => Number::Int(a.checked_mul(b)?),
        (Div, Number::Int(a), Number::Int(b)) => Number::Int(a.checked_div(b)?),
        (Mod, Number::Int(a), Number::Int(b)) => Number::Int(a.checked_rem(b)?),

        (Equal, Number::Int(a), Number::Int(b)) => truth(a == b),
        (NotEqual, Number::Int(a), Number::Int(b)) => truth(a != b),
        (Less, Number::Int(a), Number::Int(b)) => truth(a < b),
        (LessOrEqual, Number::Int(a), Number::Int(b)) => truth(a <= b),
        (Greater, Number::Int(a), Number::Int(b)) => truth(a > b),
        (GreaterOrEqual, Number::Int(a), Number::Int(b)) => truth(a >= b),

        (Mod, _, _) => return None,
        (op, a, b) => {
            let (a, b) = (a.as_float(), b.as_float());
            match op {
                Add => Number::Float(a + b),
                Sub => Number::Float(a - b),
                Mul => Number::Float(a * b),
                Div if b != 0.0 => Number::Float(a / b),
                Equal => truth(a == b),
                NotEqual => truth(a != b),
                Less => truth(a < b),
                LessOrEqual => truth(a <= b),
                Greater => truth(a > b),
                GreaterOrEqual => truth(a >= b),
                _ => return None,
            }
        }
    };

    result.render()
}
