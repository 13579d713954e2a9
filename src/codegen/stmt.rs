//! Sentencias y control de flujo.

use std::fmt::Write;

use super::{resolve, Domain, Emit, Emitter, Loop, EXIT};
use crate::{
    ast::{self, Block, Expr, Statement, StatementKind},
    source::Located,
    types::Type,
};

impl Emitter {
    pub(super) fn statement(&mut self, statement: &Statement) -> Emit {
        match &statement.kind {
            StatementKind::Declaration(declaration) => self.declaration(declaration),

            // Las funciones se emiten aparte, después de `_start`
            StatementKind::Prototype(_) | StatementKind::Function(_) => Ok(()),

            StatementKind::Assignment(assignment) => self.assignment(assignment),

            StatementKind::Call(call) => {
                if self.call(call)? == Some(Domain::Float) {
                    emit!(self, "fstp", "st0")?;
                }

                Ok(())
            }

            StatementKind::Block(block) => self.block(block),

            StatementKind::If {
                condition,
                then,
                otherwise,
            } => {
                let on_false = self.label();
                self.condition(condition, &on_false)?;
                self.block(then)?;

                match otherwise {
                    None => self.set_label(&on_false),
                    Some(otherwise) => {
                        let end = self.label();
                        emit!(self, "jmp", "{}", end)?;

                        self.set_label(&on_false)?;
                        self.block(otherwise)?;
                        self.set_label(&end)
                    }
                }
            }

            StatementKind::While { condition, body } => {
                let (start, end) = (self.label(), self.label());

                self.set_label(&start)?;
                self.condition(condition, &end)?;
                self.body(body, &start, &end)?;

                emit!(self, "jmp", "{}", start)?;
                self.set_label(&end)
            }

            StatementKind::For {
                init,
                condition,
                update,
                body,
            } => {
                self.table.push_scope();
                if let Some(init) = init {
                    self.statement(init)?;
                }

                let (start, next, end) = (self.label(), self.label(), self.label());

                self.set_label(&start)?;
                self.condition(condition, &end)?;
                self.body(body, &next, &end)?;

                self.set_label(&next)?;
                if let Some(update) = update {
                    self.statement(update)?;
                }

                emit!(self, "jmp", "{}", start)?;
                self.set_label(&end)?;

                self.table.pop_scope();
                Ok(())
            }

            StatementKind::Break => match self.loops.last() {
                Some(innermost) => {
                    let end = innermost.end.clone();
                    emit!(self, "jmp", "{}", end)
                }

                None => Ok(()),
            },

            StatementKind::Continue => match self.loops.last() {
                Some(innermost) => {
                    let next = innermost.next.clone();
                    emit!(self, "jmp", "{}", next)
                }

                None => Ok(()),
            },

            StatementKind::Return(value) => self.return_(value.as_ref()),
        }
    }

    fn block(&mut self, block: &Block) -> Emit {
        self.table.push_scope();
        for statement in &block.statements {
            self.statement(statement)?;
        }

        self.table.pop_scope();
        Ok(())
    }

    /// Cuerpo de un ciclo, con sus destinos de `continue` y `break`.
    fn body(&mut self, body: &Block, next: &str, end: &str) -> Emit {
        self.loops.push(Loop {
            next: next.to_owned(),
            end: end.to_owned(),
        });

        let result = self.block(body);
        self.loops.pop();

        result
    }

    /// Salta a `on_false` si la condición es falsa.
    fn condition(&mut self, condition: &Located<Expr>, on_false: &str) -> Emit {
        if let Domain::Float = self.expr(condition)? {
            self.truth(Domain::Float)?;
        }

        emit!(self, "cmp", "eax, 0")?;
        emit!(self, "je", "{}", on_false)
    }

    fn declaration(&mut self, declaration: &ast::Declaration) -> Emit {
        let typ = match resolve(declaration.typ.as_ref()) {
            Type::Void => Type::Int,
            typ => typ,
        };

        // El inicializador no ve a la variable que declara
        let init = match &declaration.init {
            Some(init) => Some(self.expr(init)?),
            None => None,
        };

        let name = declaration.name.as_ref();
        let length = declaration.length.as_ref().map(|length| *length.as_ref());

        let slot = self.allocate(name, typ, length)?;
        self.table.declare(name.clone(), slot.clone());

        match init {
            Some(domain) => self.store(domain, &slot, false),
            None => Ok(()),
        }
    }

    fn assignment(&mut self, assignment: &ast::Assignment) -> Emit {
        let target = &assignment.target;
        let slot = self.table.lookup(target.name.as_ref().as_ref()).cloned();

        match (&target.index, slot) {
            (None, Some(slot)) => {
                let domain = self.expr(&assignment.value)?;
                self.store(domain, &slot, false)
            }

            (Some(index), Some(slot)) => {
                self.index(index)?;
                emit!(self, "push", "eax")?;

                let domain = self.expr(&assignment.value)?;
                emit!(self, "pop", "ecx")?;

                self.store(domain, &slot, true)
            }

            (_, None) => {
                log::debug!("no storage for `{}`", target.name.as_ref());

                if self.expr(&assignment.value)? == Domain::Float {
                    emit!(self, "fstp", "st0")?;
                }

                Ok(())
            }
        }
    }

    fn return_(&mut self, value: Option<&Located<Expr>>) -> Emit {
        let ret = match &self.frame {
            Some(frame) => frame.ret,
            None => Type::Int,
        };

        match (value, ret) {
            (Some(value), Type::Void) => {
                if self.expr(value)? == Domain::Float {
                    emit!(self, "fstp", "st0")?;
                }
            }

            (Some(value), ret) => {
                let domain = self.expr(value)?;
                self.convert(domain, ret)?;
            }

            (None, Type::Void) => (),
            (None, Type::Double) => emit!(self, "fldz")?,
            (None, _) => emit!(self, "mov", "eax, 0")?,
        }

        emit!(self, "jmp", "{}", EXIT)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::assembly;
    use crate::ast::{build::*, BinOp};

    fn lines(text: &str) -> Vec<&str> {
        text.lines().map(str::trim).collect()
    }

    fn window<'a>(text: &'a str, from: &str, to: &str) -> Vec<&'a str> {
        let all = lines(text);
        let start = all.iter().position(|line| *line == from).unwrap();
        let end = start + all[start..].iter().position(|line| *line == to).unwrap();

        all[start..=end].to_vec()
    }

    #[test]
    fn if_else_jumps_around_the_else_branch() {
        let text = assembly(vec![
            decl("int", "c", Some(num("1"))),
            decl("int", "x", None),
            if_(
                var("c"),
                vec![assign("x", num("1"))],
                Some(vec![assign("x", num("2"))]),
            ),
        ]);

        assert_eq!(
            window(&text, "mov     eax, dword [v_c]", ".L1:"),
            [
                "mov     eax, dword [v_c]",
                "cmp     eax, 0",
                "je      .L0",
                "mov     eax, 1",
                "mov     dword [v_x], eax",
                "jmp     .L1",
                ".L0:",
                "mov     eax, 2",
                "mov     dword [v_x], eax",
                ".L1:",
            ]
        );
    }

    #[test]
    fn while_loops_test_at_the_top() {
        let text = assembly(vec![
            decl("int", "i", Some(num("0"))),
            while_(
                bin(var("i"), BinOp::Less, num("3")),
                vec![assign("i", bin(var("i"), BinOp::Add, num("1"))), cont()],
            ),
        ]);

        let body = window(&text, ".L0:", ".L1:");
        assert_eq!(body[body.len() - 3..], ["jmp     .L0", "jmp     .L0", ".L1:"]);
        assert!(body.contains(&"je      .L1"));
    }

    #[test]
    fn for_continue_runs_the_update() {
        let text = assembly(vec![for_(
            Some(decl("int", "i", Some(num("0")))),
            bin(var("i"), BinOp::Less, num("5")),
            Some(assign("i", bin(var("i"), BinOp::Add, num("1")))),
            vec![
                if_(bin(var("i"), BinOp::Equal, num("2")), vec![brk()], None),
                cont(),
            ],
        )]);

        let all = lines(&text);
        let next = all.iter().position(|line| *line == ".L1:").unwrap();
        let end = all.iter().position(|line| *line == ".L2:").unwrap();

        assert!(all.contains(&"jmp     .L2"));
        assert!(all.contains(&"jmp     .L1"));
        assert_eq!(all[next + 1], "mov     eax, dword [v_i]");
        assert_eq!(all[end - 1], "jmp     .L0");
    }

    #[test]
    fn element_stores_index_through_ecx() {
        let text = assembly(vec![
            array("int", "v", 4),
            assign_elem("v", num("2"), num("7")),
            decl("int", "x", Some(elem("v", num("2")))),
        ]);

        assert_eq!(
            window(&text, "mov     eax, 2", "mov     dword [v_v + ecx*4], eax"),
            [
                "mov     eax, 2",
                "push    eax",
                "mov     eax, 7",
                "pop     ecx",
                "mov     dword [v_v + ecx*4], eax",
            ]
        );

        assert!(text.contains("mov     eax, dword [v_v + ecx*4]"));
    }

    #[test]
    fn recursion_reads_arguments_from_the_frame() {
        let text = assembly(vec![function(
            "int",
            "fact",
            vec![param("int", "n")],
            vec![
                if_(
                    bin(var("n"), BinOp::LessOrEqual, num("1")),
                    vec![ret(Some(num("1")))],
                    None,
                ),
                ret(Some(bin(
                    var("n"),
                    BinOp::Mul,
                    call("fact", vec![bin(var("n"), BinOp::Sub, num("1"))]),
                ))),
            ],
        )]);

        assert!(text.contains("mov     eax, dword [ebp + 8]"));
        assert!(text.contains("call    fact\n\tadd     esp, 4"));
        assert!(text.contains("imul    eax, ecx"));
        assert!(!text.contains("extern"));
        assert!(!text.contains("call    main"));
    }

    #[test]
    fn top_level_returns_exit_the_program() {
        let text = assembly(vec![ret(Some(num("4")))]);

        assert!(text.contains("mov     eax, 4\n\tjmp     .exit"));
    }

    #[test]
    fn discarded_double_results_leave_the_fpu() {
        let text = assembly(vec![
            function("double", "half", vec![], vec![ret(Some(num("0.5")))]),
            call_stmt("half", vec![]),
        ]);

        assert!(text.contains("call    half\n\tfstp    st0"));
    }
}
