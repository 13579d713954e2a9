//! Análisis de vida y eliminación de código muerto.
//!
//! Los sucesores de cada instrucción se reconstruyen a partir de las
//! etiquetas: `goto` tiene como único sucesor a su etiqueta, `if` tiene
//! su etiqueta y la instrucción siguiente, `return` no tiene sucesores y
//! el resto continúa en la instrucción siguiente. Una marca de función
//! no es sucesora de nada, por lo que el final de cada función (y del
//! código de nivel superior) es una salida del programa.
//!
//! En toda salida, al igual que en cada `call`, las globales se
//! consideran vivas: quien llama o quien es llamado puede leerlas.

use std::collections::{HashMap, HashSet};

use crate::ir::{Instruction, Label, Operand};

type Live = HashSet<Operand>;

/// Nombres leídos por una instrucción.
fn uses(instruction: &Instruction) -> Vec<Operand> {
    let mut names = Vec::new();
    let mut collect = |name: &Operand| names.push(name.clone());

    match instruction {
        Instruction::Function { .. }
        | Instruction::Label(_)
        | Instruction::Goto(_)
        | Instruction::Return(None) => (),

        Instruction::If { condition, .. } => condition.for_each_name(&mut collect),
        Instruction::Return(Some(value)) => value.for_each_name(&mut collect),

        Instruction::Copy { source, result } => {
            source.for_each_name(&mut collect);
            if let Operand::Element { index, .. } = result {
                index.for_each_name(&mut collect);
            }
        }

        Instruction::Unary { operand, .. } => operand.for_each_name(&mut collect),

        Instruction::Binary { left, right, .. } => {
            left.for_each_name(&mut collect);
            right.for_each_name(&mut collect);
        }

        Instruction::Call { args, .. } => {
            for arg in args {
                arg.for_each_name(&mut collect);
            }
        }
    }

    names
}

/// Nombre que una instrucción escribe por completo, si lo hay.
///
/// Una escritura a un elemento no mata al arreglo.
fn defines(instruction: &Instruction) -> Option<Operand> {
    match instruction {
        Instruction::Call { result, .. } => Some(Operand::Temp(*result)),
        _ => instruction.result().filter(|result| result.is_name()).cloned(),
    }
}

/// Solo los cálculos puros pueden eliminarse.
fn removable(instruction: &Instruction, live_out: &Live) -> bool {
    match instruction {
        Instruction::Copy { result, .. }
        | Instruction::Unary { result, .. }
        | Instruction::Binary { result, .. } => result.is_name() && !live_out.contains(result),

        _ => false,
    }
}

struct Graph {
    successors: Vec<Vec<usize>>,

    /// Instrucciones desde las cuales el control puede abandonar la
    /// unidad de código actual.
    exits: Vec<bool>,
}

impl Graph {
    fn build(code: &[Instruction]) -> Self {
        let labels: HashMap<Label, usize> = code
            .iter()
            .enumerate()
            .filter_map(|(i, instruction)| match instruction {
                Instruction::Label(label) => Some((*label, i)),
                _ => None,
            })
            .collect();

        let falls_into = |i: usize| match code.get(i + 1) {
            None | Some(Instruction::Function { .. }) => None,
            Some(_) => Some(i + 1),
        };

        let mut successors = Vec::with_capacity(code.len());
        let mut exits = Vec::with_capacity(code.len());

        for (i, instruction) in code.iter().enumerate() {
            let (next, exit) = match instruction {
                Instruction::Return(_) => (vec![], true),

                Instruction::Goto(label) => match labels.get(label) {
                    Some(target) => (vec![*target], false),
                    None => (vec![], true),
                },

                Instruction::If { target, .. } => {
                    let mut next: Vec<_> = labels.get(target).copied().into_iter().collect();
                    let fall = falls_into(i);
                    next.extend(fall);

                    (next, fall.is_none() || !labels.contains_key(target))
                }

                _ => match falls_into(i) {
                    Some(fall) => (vec![fall], false),
                    None => (vec![], true),
                },
            };

            successors.push(next);
            exits.push(exit);
        }

        Graph { successors, exits }
    }
}

/// Calcula el conjunto de nombres vivos a la salida de cada instrucción.
pub fn live_out(code: &[Instruction], globals: &HashSet<Operand>) -> Vec<Live> {
    let graph = Graph::build(code);
    let uses: Vec<_> = code.iter().map(uses).collect();
    let defines: Vec<_> = code.iter().map(defines).collect();

    let mut live_in = vec![Live::new(); code.len()];
    let mut live_out = vec![Live::new(); code.len()];

    let mut changed = true;
    let mut iterations = 0;

    while changed {
        changed = false;
        iterations += 1;

        for i in (0..code.len()).rev() {
            let mut out = Live::new();
            if graph.exits[i] {
                out.extend(globals.iter().cloned());
            }

            for &next in &graph.successors[i] {
                out.extend(live_in[next].iter().cloned());
            }

            let mut inn = out.clone();
            if let Some(defined) = &defines[i] {
                inn.remove(defined);
            }

            inn.extend(uses[i].iter().cloned());
            if let Instruction::Call { .. } = code[i] {
                inn.extend(globals.iter().cloned());
            }

            if out != live_out[i] || inn != live_in[i] {
                live_out[i] = out;
                live_in[i] = inn;
                changed = true;
            }
        }
    }

    log::trace!("liveness converged after {} iterations", iterations);
    live_out
}

/// Elimina definiciones muertas. Retorna la cantidad de instrucciones
/// removidas.
pub fn eliminate(code: &mut Vec<Instruction>, globals: &HashSet<Operand>) -> usize {
    let live_out = live_out(code, globals);

    let mut index = 0;
    let before = code.len();

    code.retain(|instruction| {
        let keep = !removable(instruction, &live_out[index]);
        if !keep {
            log::trace!("dead: `{}`", instruction);
        }

        index += 1;
        keep
    });

    before - code.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ast::{BinOp, Identifier},
        ir::Temp,
    };

    fn var(name: &str) -> Operand {
        Operand::Var(Identifier::from(name))
    }

    fn temp(n: u32) -> Operand {
        Operand::Temp(Temp(n))
    }

    fn constant(text: &str) -> Operand {
        Operand::Const(text.to_owned())
    }

    fn copy(source: Operand, result: Operand) -> Instruction {
        Instruction::Copy { source, result }
    }

    fn add(left: Operand, right: Operand, result: Operand) -> Instruction {
        Instruction::Binary {
            op: BinOp::Add,
            left,
            right,
            result,
        }
    }

    fn run(mut code: Vec<Instruction>, globals: &[&str]) -> Vec<String> {
        let globals = globals.iter().map(|name| var(name)).collect();
        eliminate(&mut code, &globals);
        code.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn unused_temporaries_are_removed() {
        let code = run(
            vec![
                add(var("a"), constant("1"), temp(0)),
                add(var("a"), constant("2"), temp(1)),
                Instruction::Return(Some(temp(1))),
            ],
            &["a"],
        );

        assert_eq!(code, ["t1 = a + 2", "return t1"]);
    }

    #[test]
    fn globals_survive_the_end_of_the_program() {
        let code = run(
            vec![copy(constant("1"), var("g")), copy(constant("2"), var("l"))],
            &["g"],
        );

        assert_eq!(code, ["g = 1"]);
    }

    #[test]
    fn calls_are_never_removed_and_read_globals() {
        let code = run(
            vec![
                Instruction::Function {
                    name: Identifier::from("main"),
                    params: vec![],
                },
                copy(constant("1"), var("g")),
                Instruction::Call {
                    function: Identifier::from("f"),
                    args: vec![],
                    result: Temp(0),
                },
                copy(constant("2"), var("g")),
                Instruction::Return(None),
            ],
            &["g"],
        );

        assert_eq!(
            code,
            [
                "function main():",
                "g = 1",
                "t0 = call f()",
                "g = 2",
                "return"
            ]
        );
    }

    #[test]
    fn overwritten_definitions_are_dead() {
        let code = run(
            vec![
                copy(constant("1"), var("g")),
                copy(constant("2"), var("g")),
            ],
            &["g"],
        );

        assert_eq!(code, ["g = 2"]);
    }

    #[test]
    fn loop_carried_values_stay_alive() {
        let code = vec![
            Instruction::Function {
                name: Identifier::from("f"),
                params: vec![],
            },
            copy(constant("0"), var("i")),
            Instruction::Label(Label(0)),
            Instruction::Binary {
                op: BinOp::Less,
                left: var("i"),
                right: constant("3"),
                result: temp(0),
            },
            Instruction::If {
                condition: temp(0),
                target: Label(1),
            },
            Instruction::Goto(Label(2)),
            Instruction::Label(Label(1)),
            add(var("i"), constant("1"), temp(1)),
            copy(temp(1), var("i")),
            Instruction::Goto(Label(0)),
            Instruction::Label(Label(2)),
            Instruction::Return(Some(var("i"))),
        ];

        let expected: Vec<_> = code.iter().map(ToString::to_string).collect();
        assert_eq!(run(code, &[]), expected);
    }

    #[test]
    fn array_stores_are_kept() {
        let element = Operand::Element {
            array: Identifier::from("v"),
            index: Box::new(temp(0)),
        };

        let code = run(
            vec![
                Instruction::Function {
                    name: Identifier::from("f"),
                    params: vec![],
                },
                add(var("i"), constant("1"), temp(0)),
                copy(constant("7"), element),
                Instruction::Return(None),
            ],
            &[],
        );

        assert_eq!(
            code,
            ["function f():", "t0 = i + 1", "v[t0] = 7", "return"]
        );
    }

    #[test]
    fn function_markers_end_the_previous_unit() {
        let code = run(
            vec![
                copy(constant("1"), var("x")),
                Instruction::Function {
                    name: Identifier::from("f"),
                    params: vec![],
                },
                Instruction::Return(Some(var("x"))),
            ],
            &[],
        );

        assert_eq!(code, ["function f():", "return x"]);
    }
}
