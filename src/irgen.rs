//! Generación de código intermedio.
//!
//! Descenso recursivo sobre el árbol: cada expresión retorna el
//! [`Operand`] que contiene su valor y cada sentencia emite sus
//! instrucciones en orden. El código de nivel superior se emite primero
//! y los cuerpos de función se agregan al final, cada uno precedido por
//! su marca [`Instruction::Function`].
//!
//! Una declaración que sombrea a otra visible, o que reutiliza el nombre
//! de otra con un tipo distinto, recibe un nombre propio (`x.1`, `x.2`,
//! ...). Así el optimizador nunca confunde dos variables distintas.
//!
//! No se revalida semántica alguna. Un `break` fuera de ciclo, por
//! ejemplo, simplemente no emite nada.

use std::collections::{BTreeMap, HashMap};

use crate::{
    ast::{self, Block, Expr, Identifier, Statement, StatementKind},
    ir::{Instruction, Label, Names, Operand, Program},
    source::Located,
    symbol::SymbolTable,
    types::Type,
};

pub fn generate(program: &ast::Program) -> Program {
    let mut generator = Generator::default();

    generator.table.push_scope();
    for statement in &program.statements {
        generator.statement(statement);
    }

    let Generator {
        mut code,
        functions,
        globals,
        variables,
        ..
    } = generator;

    code.extend(functions);
    log::debug!("generated {} instructions", code.len());

    Program {
        globals,
        variables,
        code,
    }
}

/// Destinos de `continue` y `break` de un ciclo.
struct Loop {
    next: Label,
    end: Label,
}

#[derive(Default)]
struct Generator {
    names: Names,
    code: Vec<Instruction>,
    functions: Vec<Instruction>,
    globals: Vec<Identifier>,
    loops: Vec<Loop>,
    in_function: bool,

    /// Nombre en el código intermedio de cada variable visible.
    table: SymbolTable<Identifier>,
    variables: BTreeMap<Identifier, Type>,
    renames: HashMap<Identifier, u32>,
}

impl Generator {
    fn push(&mut self, instruction: Instruction) {
        self.code.push(instruction);
    }

    fn statements(&mut self, block: &Block) {
        self.table.push_scope();
        for statement in &block.statements {
            self.statement(statement);
        }

        self.table.pop_scope();
    }

    /// Registra una declaración y retorna su nombre en el código intermedio.
    fn declare(&mut self, name: &Identifier, typ: &str) -> Identifier {
        let typ = typ.parse::<Type>().ok();

        let shadows = self.table.lookup(name.as_ref()).is_some();
        let conflicts = match (typ, self.variables.get(name)) {
            (Some(typ), Some(other)) => typ != *other,
            _ => false,
        };

        let unique = if shadows || conflicts {
            let counter = self.renames.entry(name.clone()).or_insert(0);
            *counter += 1;

            Identifier::from(format!("{}.{}", name, counter).as_str())
        } else {
            name.clone()
        };

        if let Some(typ) = typ {
            self.variables.insert(unique.clone(), typ);
        }

        self.table.declare(name.clone(), unique.clone());
        unique
    }

    fn resolve(&self, name: &Identifier) -> Identifier {
        self.table
            .lookup(name.as_ref())
            .cloned()
            .unwrap_or_else(|| name.clone())
    }

    fn statement(&mut self, statement: &Statement) {
        match &statement.kind {
            StatementKind::Declaration(declaration) => {
                // El inicializador no ve a la variable que declara
                let source = declaration.init.as_ref().map(|init| self.expr(init));

                let name = self.declare(declaration.name.as_ref(), declaration.typ.as_ref());
                if !self.in_function && !self.globals.contains(&name) {
                    self.globals.push(name.clone());
                }

                if let Some(source) = source {
                    let result = Operand::Var(name);
                    self.push(Instruction::Copy { source, result });
                }
            }

            StatementKind::Prototype(_) => (),
            StatementKind::Function(function) => self.function(function),

            StatementKind::Assignment(assignment) => {
                let target = &assignment.target;
                let name = self.resolve(target.name.as_ref());

                let result = match &target.index {
                    None => Operand::Var(name),
                    Some(index) => Operand::Element {
                        array: name,
                        index: Box::new(self.expr(index)),
                    },
                };

                let source = self.expr(&assignment.value);
                self.push(Instruction::Copy { source, result });
            }

            StatementKind::Call(call) => {
                self.call(call);
            }

            StatementKind::Block(block) => self.statements(block),

            StatementKind::If {
                condition,
                then,
                otherwise,
            } => {
                let condition = self.expr(condition);
                let (on_true, on_false) = (self.names.label(), self.names.label());

                self.push(Instruction::If {
                    condition,
                    target: on_true,
                });

                self.push(Instruction::Goto(on_false));
                self.push(Instruction::Label(on_true));
                self.statements(then);

                match otherwise {
                    None => self.push(Instruction::Label(on_false)),
                    Some(otherwise) => {
                        let end = self.names.label();

                        self.push(Instruction::Goto(end));
                        self.push(Instruction::Label(on_false));
                        self.statements(otherwise);
                        self.push(Instruction::Label(end));
                    }
                }
            }

            StatementKind::While { condition, body } => {
                let (start, enter, end) =
                    (self.names.label(), self.names.label(), self.names.label());

                self.push(Instruction::Label(start));
                self.test(condition, enter, end);

                self.loops.push(Loop { next: start, end });
                self.statements(body);
                self.loops.pop();

                self.push(Instruction::Goto(start));
                self.push(Instruction::Label(end));
            }

            StatementKind::For {
                init,
                condition,
                update,
                body,
            } => {
                self.table.push_scope();
                if let Some(init) = init {
                    self.statement(init);
                }

                let start = self.names.label();
                let enter = self.names.label();
                let next = self.names.label();
                let end = self.names.label();

                self.push(Instruction::Label(start));
                self.test(condition, enter, end);

                self.loops.push(Loop { next, end });
                self.statements(body);
                self.loops.pop();

                self.push(Instruction::Label(next));
                if let Some(update) = update {
                    self.statement(update);
                }

                self.push(Instruction::Goto(start));
                self.push(Instruction::Label(end));

                self.table.pop_scope();
            }

            StatementKind::Break => {
                if let Some(innermost) = self.loops.last() {
                    let end = innermost.end;
                    self.push(Instruction::Goto(end));
                }
            }

            StatementKind::Continue => {
                if let Some(innermost) = self.loops.last() {
                    let next = innermost.next;
                    self.push(Instruction::Goto(next));
                }
            }

            StatementKind::Return(value) => {
                let value = value.as_ref().map(|value| self.expr(value));
                self.push(Instruction::Return(value));
            }
        }
    }

    /// Evalúa la condición de un ciclo y salta a `enter` o a `end`.
    fn test(&mut self, condition: &Located<Expr>, enter: Label, end: Label) {
        let condition = self.expr(condition);
        self.push(Instruction::If {
            condition,
            target: enter,
        });

        self.push(Instruction::Goto(end));
        self.push(Instruction::Label(enter));
    }

    fn function(&mut self, function: &ast::Function) {
        // Parámetros y cuerpo comparten un mismo contexto
        self.table.push_scope();

        let mut params = Vec::new();
        for parameter in &function.parameters {
            if let Some(name) = &parameter.name {
                params.push(self.declare(name.as_ref(), parameter.typ.as_ref()));
            }
        }

        let outer = std::mem::take(&mut self.code);
        self.in_function = true;

        self.push(Instruction::Function {
            name: function.name.as_ref().clone(),
            params,
        });

        for statement in &function.body.statements {
            self.statement(statement);
        }

        self.table.pop_scope();
        self.in_function = false;
        let body = std::mem::replace(&mut self.code, outer);
        self.functions.extend(body);
    }

    fn call(&mut self, call: &ast::Call) -> Operand {
        let args = call.args.iter().map(|arg| self.expr(arg)).collect();
        let result = self.names.temp();

        self.push(Instruction::Call {
            function: call.callee.as_ref().clone(),
            args,
            result,
        });

        Operand::Temp(result)
    }

    fn expr(&mut self, expr: &Located<Expr>) -> Operand {
        match expr.as_ref() {
            Expr::Literal(literal) => Operand::Const(literal.text()),
            Expr::Var(name) => Operand::Var(self.resolve(name)),

            Expr::Element(array, index) => Operand::Element {
                array: self.resolve(array),
                index: Box::new(self.expr(index)),
            },

            Expr::Unary(op, operand) => {
                let operand = self.expr(operand);
                let result = Operand::Temp(self.names.temp());

                self.push(Instruction::Unary {
                    op: *op,
                    operand,
                    result: result.clone(),
                });

                result
            }

            Expr::Binary(left, op, right) => {
                let left = self.expr(left);
                let right = self.expr(right);
                let result = Operand::Temp(self.names.temp());

                self.push(Instruction::Binary {
                    op: *op,
                    left,
                    right,
                    result: result.clone(),
                });

                result
            }

            Expr::Call(call) => self.call(call),
        }
    }
}
