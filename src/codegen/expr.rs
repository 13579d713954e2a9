//! Evaluación de expresiones.
//!
//! Los operandos izquierdos se resguardan en la pila del procesador
//! mientras se evalúa el derecho, sin importar su dominio. Así ninguna
//! llamada anidada encuentra valores pendientes en la FPU.

use std::fmt::Write;

use super::{Domain, Emit, Emitter, Slot};
use crate::{
    ast::{self, BinOp, Expr, Identifier, Literal, UnaryOp},
    source::Located,
    types::Type,
};

impl Emitter {
    pub(super) fn expr(&mut self, expr: &Located<Expr>) -> Emit<Domain> {
        match expr.as_ref() {
            Expr::Literal(literal) => self.literal(literal),

            Expr::Var(name) => match self.table.lookup(name.as_ref()).cloned() {
                Some(slot) => self.load(&slot, false),
                None => self.undefined(name),
            },

            Expr::Element(name, index) => {
                self.index(index)?;
                emit!(self, "mov", "ecx, eax")?;

                match self.table.lookup(name.as_ref()).cloned() {
                    Some(slot) => self.load(&slot, true),
                    None => self.undefined(name),
                }
            }

            Expr::Unary(op, operand) => {
                let domain = self.expr(operand)?;
                match (op, domain) {
                    (UnaryOp::Neg, Domain::Int) => emit!(self, "neg", "eax")?,
                    (UnaryOp::Neg, Domain::Float) => emit!(self, "fchs")?,
                    (UnaryOp::Not, domain) => {
                        self.truth(domain)?;
                        emit!(self, "xor", "eax, 1")?;
                        return Ok(Domain::Int);
                    }
                }

                Ok(domain)
            }

            Expr::Binary(left, op, right) => self.binary(left, *op, right),

            Expr::Call(call) => match self.call(call)? {
                Some(domain) => Ok(domain),
                None => {
                    emit!(self, "mov", "eax, 0")?;
                    Ok(Domain::Int)
                }
            },
        }
    }

    fn literal(&mut self, literal: &Literal) -> Emit<Domain> {
        match literal {
            Literal::Number(text) if text.contains('.') => {
                let label = self.constant(text)?;
                emit!(self, "fld", "qword [{}]", label)?;
                return Ok(Domain::Float);
            }

            Literal::Number(text) => emit!(self, "mov", "eax, {}", text)?,
            Literal::Bool(value) => emit!(self, "mov", "eax, {}", *value as u8)?,

            // NASM solo interpreta secuencias de escape entre comillas invertidas
            Literal::Char(lexeme) if lexeme.contains('\\') => {
                let inner = lexeme.trim_matches('\'');
                emit!(self, "mov", "eax, `{}`", inner)?
            }

            Literal::Char(lexeme) => emit!(self, "mov", "eax, {}", lexeme)?,
        }

        Ok(Domain::Int)
    }

    /// Un nombre sin declarar ya fue reportado; se evalúa como cero.
    fn undefined(&mut self, name: &Identifier) -> Emit<Domain> {
        log::debug!("no storage for `{}`", name);
        emit!(self, "mov", "eax, 0")?;
        Ok(Domain::Int)
    }

    /// Evalúa un índice de arreglo como entero en `eax`.
    pub(super) fn index(&mut self, index: &Located<Expr>) -> Emit {
        let domain = self.expr(index)?;
        self.convert(domain, Type::Int)
    }

    pub(super) fn load(&mut self, slot: &Slot, indexed: bool) -> Emit<Domain> {
        let address = slot.address(indexed);
        match slot.typ {
            Type::Double => emit!(self, "fld", "{}", address)?,
            Type::Char => emit!(self, "movsx", "eax, {}", address)?,
            _ => emit!(self, "mov", "eax, {}", address)?,
        }

        Ok(Domain::from(slot.typ))
    }

    /// Almacena el valor actual, convirtiéndolo al tipo del destino.
    ///
    /// Si `indexed`, el índice del elemento debe estar en `ecx`.
    pub(super) fn store(&mut self, domain: Domain, slot: &Slot, indexed: bool) -> Emit {
        self.convert(domain, slot.typ)?;

        let address = slot.address(indexed);
        match slot.typ {
            Type::Double => emit!(self, "fstp", "{}", address),
            Type::Char => emit!(self, "mov", "{}, al", address),
            _ => emit!(self, "mov", "{}, eax", address),
        }
    }

    /// Lleva el valor actual al dominio de `typ`. No toca `ecx`.
    pub(super) fn convert(&mut self, from: Domain, typ: Type) -> Emit {
        if typ == Type::Bool {
            return self.truth(from);
        }

        match (from, Domain::from(typ)) {
            (Domain::Int, Domain::Float) => self.eax_to_float(),
            (Domain::Float, Domain::Int) => self.float_to_eax(),
            _ => Ok(()),
        }
    }

    /// Reduce el valor actual a 0 o 1 en `eax`.
    pub(super) fn truth(&mut self, domain: Domain) -> Emit {
        match domain {
            Domain::Int => emit!(self, "cmp", "eax, 0")?,
            Domain::Float => {
                emit!(self, "fldz")?;
                emit!(self, "fcomip", "st0, st1")?;
                emit!(self, "fstp", "st0")?;
            }
        }

        emit!(self, "setne", "al")?;
        emit!(self, "movzx", "eax, al")
    }

    pub(super) fn eax_to_float(&mut self) -> Emit {
        emit!(self, "push", "eax")?;
        emit!(self, "fild", "dword [esp]")?;
        emit!(self, "add", "esp, 4")
    }

    /// Truncamiento hacia cero, como en C.
    pub(super) fn float_to_eax(&mut self) -> Emit {
        emit!(self, "sub", "esp, 4")?;
        emit!(self, "fisttp", "dword [esp]")?;
        emit!(self, "pop", "eax")
    }

    /// Empuja el valor actual a la pila. Retorna los bytes empujados.
    fn push_value(&mut self, domain: Domain) -> Emit<u32> {
        match domain {
            Domain::Int => {
                emit!(self, "push", "eax")?;
                Ok(4)
            }

            Domain::Float => {
                emit!(self, "sub", "esp, 8")?;
                emit!(self, "fstp", "qword [esp]")?;
                Ok(8)
            }
        }
    }

    /// Recupera un valor empujado por [`Emitter::push_value()`].
    fn pop_value(&mut self, domain: Domain) -> Emit {
        match domain {
            Domain::Int => emit!(self, "pop", "eax"),
            Domain::Float => {
                emit!(self, "fld", "qword [esp]")?;
                emit!(self, "add", "esp, 8")
            }
        }
    }

    /// Como [`Emitter::pop_value()`], pero siempre hacia `st0`.
    fn pop_as_float(&mut self, domain: Domain) -> Emit {
        match domain {
            Domain::Int => {
                emit!(self, "fild", "dword [esp]")?;
                emit!(self, "add", "esp, 4")
            }

            Domain::Float => self.pop_value(domain),
        }
    }

    fn binary(&mut self, left: &Located<Expr>, op: BinOp, right: &Located<Expr>) -> Emit<Domain> {
        let left = self.expr(left)?;
        self.push_value(left)?;
        let right = self.expr(right)?;

        if op.is_logical() {
            self.truth(right)?;
            emit!(self, "mov", "ecx, eax")?;
            self.pop_value(left)?;
            self.truth(left)?;

            let opcode = if op == BinOp::And { "and" } else { "or" };
            emit!(self, opcode, "eax, ecx")?;

            return Ok(Domain::Int);
        }

        if (left, right) == (Domain::Int, Domain::Int) {
            emit!(self, "mov", "ecx, eax")?;
            emit!(self, "pop", "eax")?;
            return self.integer(op);
        }

        // Promoción: ambos operandos pasan a la FPU
        if right == Domain::Int {
            self.eax_to_float()?;
        }

        self.pop_as_float(left)?;
        self.float(op)
    }

    /// Operación entera con `eax` como izquierdo y `ecx` como derecho.
    fn integer(&mut self, op: BinOp) -> Emit<Domain> {
        match op {
            BinOp::Add => emit!(self, "add", "eax, ecx")?,
            BinOp::Sub => emit!(self, "sub", "eax, ecx")?,
            BinOp::Mul => emit!(self, "imul", "eax, ecx")?,

            BinOp::Div | BinOp::Mod => {
                emit!(self, "cdq")?;
                emit!(self, "idiv", "ecx")?;
                if op == BinOp::Mod {
                    emit!(self, "mov", "eax, edx")?;
                }
            }

            _ => {
                let set = match op {
                    BinOp::Equal => "sete",
                    BinOp::NotEqual => "setne",
                    BinOp::Less => "setl",
                    BinOp::LessOrEqual => "setle",
                    BinOp::Greater => "setg",
                    _ => "setge",
                };

                emit!(self, "cmp", "eax, ecx")?;
                emit!(self, set, "al")?;
                emit!(self, "movzx", "eax, al")?;
            }
        }

        Ok(Domain::Int)
    }

    /// Operación de punto flotante con `st0` como izquierdo y `st1`
    /// como derecho. Las comparaciones producen un entero.
    fn float(&mut self, op: BinOp) -> Emit<Domain> {
        match op {
            BinOp::Add => emit!(self, "faddp", "st1, st0")?,
            BinOp::Sub => emit!(self, "fsubrp", "st1, st0")?,
            BinOp::Mul => emit!(self, "fmulp", "st1, st0")?,
            BinOp::Div => emit!(self, "fdivrp", "st1, st0")?,

            BinOp::Mod => {
                let partial = self.label();

                self.set_label(&partial)?;
                emit!(self, "fprem")?;
                emit!(self, "fnstsw", "ax")?;
                emit!(self, "sahf")?;
                emit!(self, "jp", "{}", partial)?;
                emit!(self, "fstp", "st1")?;
            }

            _ => {
                let set = match op {
                    BinOp::Equal => "sete",
                    BinOp::NotEqual => "setne",
                    BinOp::Less => "setb",
                    BinOp::LessOrEqual => "setbe",
                    BinOp::Greater => "seta",
                    _ => "setae",
                };

                emit!(self, "fcomip", "st0, st1")?;
                emit!(self, "fstp", "st0")?;
                emit!(self, set, "al")?;
                emit!(self, "movzx", "eax, al")?;

                return Ok(Domain::Int);
            }
        }

        Ok(Domain::Float)
    }

    /// Emite una llamada. Retorna `None` si la función es `void`.
    pub(super) fn call(&mut self, call: &ast::Call) -> Emit<Option<Domain>> {
        self.call_by_name(call.callee.as_ref(), &call.args)
    }

    pub(super) fn call_by_name(
        &mut self,
        name: &Identifier,
        args: &[Located<Expr>],
    ) -> Emit<Option<Domain>> {
        let signature = self.signatures.get(name).cloned();
        if !self.defined.contains(name) {
            self.externs.insert(name.clone());
        }

        let mut pushed = 0;
        for (i, arg) in args.iter().enumerate().rev() {
            let mut domain = self.expr(arg)?;

            let parameter = signature
                .as_ref()
                .and_then(|signature| signature.parameters.get(i).copied());

            if let Some(typ) = parameter {
                self.convert(domain, typ)?;
                domain = Domain::from(typ);
            }

            pushed += self.push_value(domain)?;
        }

        emit!(self, "call", "{}", name)?;
        if pushed > 0 {
            emit!(self, "add", "esp, {}", pushed)?;
        }

        Ok(match signature {
            Some(signature) if signature.ret == Type::Void => None,
            Some(signature) => Some(Domain::from(signature.ret)),
            None => Some(Domain::Int),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::assembly;
    use crate::ast::{build::*, BinOp};

    fn position(text: &str, needle: &str) -> usize {
        text.find(needle)
            .unwrap_or_else(|| panic!("`{}` not found in:\n{}", needle, text))
    }

    #[test]
    fn mixed_arithmetic_promotes_to_the_fpu() {
        let text = assembly(vec![decl(
            "double",
            "d",
            Some(bin(num("1"), BinOp::Add, num("2.5"))),
        )]);

        let push = position(&text, "push    eax");
        let load = position(&text, "fld     qword [_cd0]");
        let promote = position(&text, "fild    dword [esp]");
        let add = position(&text, "faddp   st1, st0");
        let store = position(&text, "fstp    qword [v_d]");

        assert!(push < load && load < promote && promote < add && add < store);
    }

    #[test]
    fn float_comparisons_yield_integers() {
        let text = assembly(vec![
            decl("double", "x", Some(num("0.5"))),
            decl("int", "b", Some(bin(var("x"), BinOp::Less, num("1")))),
        ]);

        let compare = position(&text, "fcomip  st0, st1");
        let set = position(&text, "setb    al");
        let store = position(&text, "mov     dword [v_b], eax");

        assert!(compare < set && set < store);
    }

    #[test]
    fn integer_division_and_remainder() {
        let text = assembly(vec![
            decl("int", "a", Some(num("7"))),
            decl("int", "q", Some(bin(var("a"), BinOp::Div, num("2")))),
            decl("int", "r", Some(bin(var("a"), BinOp::Mod, num("2")))),
        ]);

        assert_eq!(text.matches("idiv    ecx").count(), 2);
        assert_eq!(text.matches("mov     eax, edx").count(), 1);
        assert!(text.contains("mov     ecx, eax\n\tpop     eax"));
    }

    #[test]
    fn doubles_truncate_into_integers() {
        let text = assembly(vec![decl("int", "i", Some(num("2.75")))]);

        let truncate = position(&text, "fisttp  dword [esp]");
        let store = position(&text, "mov     dword [v_i], eax");

        assert!(truncate < store);
    }

    #[test]
    fn characters_are_bytes() {
        let text = assembly(vec![
            decl("char", "c", Some(chr('a'))),
            decl("char", "n", Some(here_newline())),
            decl("int", "i", Some(var("c"))),
        ]);

        assert!(text.contains("mov     eax, 'a'"));
        assert!(text.contains("mov     eax, `\\n`"));
        assert!(text.contains("mov     byte [v_c], al"));
        assert!(text.contains("movsx   eax, byte [v_c]"));
    }

    fn here_newline() -> crate::source::Located<crate::ast::Expr> {
        let literal = crate::ast::Literal::Char(String::from("'\\n'"));
        located(1, 1, crate::ast::Expr::Literal(literal))
    }

    #[test]
    fn arguments_are_converted_and_pushed_right_to_left() {
        let text = assembly(vec![
            prototype("double", "f", vec![anonymous("double"), anonymous("int")]),
            decl(
                "double",
                "r",
                Some(call("f", vec![num("1"), num("2.5")])),
            ),
        ]);

        let second = position(&text, "fld     qword [_cd0]");
        let truncated = position(&text, "fisttp  dword [esp]");
        let first = position(&text, "mov     eax, 1");
        let promoted = position(&text, "fild    dword [esp]");
        let call = position(&text, "call    f");
        let cleanup = position(&text, "add     esp, 12");

        assert!(second < truncated && truncated < first);
        assert!(first < promoted && promoted < call && call < cleanup);
        assert!(text.contains("extern f"));
    }

    #[test]
    fn logical_operators_use_truth_values() {
        let text = assembly(vec![
            decl("int", "a", Some(num("2"))),
            decl("bool", "b", Some(bin(var("a"), BinOp::And, num("0")))),
        ]);

        assert!(text.contains("and     eax, ecx"));
        assert!(text.matches("setne   al").count() >= 2);
    }
}
