//! Generación de código ensamblador.
//!
//! El destino es x86 de 32 bits en sintaxis NASM. Los valores enteros,
//! de caracter y booleanos se evalúan en `eax`; los valores `double` se
//! evalúan en la pila de la FPU x87, con el valor actual en `st0`. Cada
//! función de evaluación de expresiones retorna el [`Domain`] en el que
//! quedó su resultado.
//!
//! Esta fase recorre de nuevo el árbol sintáctico en lugar de consumir
//! código intermedio, ya que requiere los tipos que el código de tres
//! direcciones descarta.
//!
//! # Disposición de la salida
//! Un encabezado, luego `.data` con constantes de punto flotante, `.bss`
//! con las variables de nivel superior y finalmente `.text`, que inicia
//! con `_start` (código de nivel superior, seguido de una llamada a
//! `main` si existe) y continúa con una etiqueta por función.
//!
//! # Convención de llamada
//! cdecl: los argumentos se empujan de derecha a izquierda, 8 bytes para
//! `double` y 4 para el resto, y quien llama los remueve. El resultado
//! queda en `eax`, o en `st0` para `double`. Cada función tiene un único
//! epílogo en `.exit`, al cual convergen todos sus `return`.
//!
//! Las etiquetas generadas son locales en NASM (inician con `.`) y quedan
//! ligadas a la última etiqueta global, `_start` o el nombre de la
//! función. Ningún identificador del programa puede chocar con ellas.

use std::{
    collections::{BTreeSet, HashMap},
    fmt::{self, Write},
    io,
};

use crate::{
    ast::{self, Identifier, StatementKind},
    symbol::SymbolTable,
    types::Type,
};

mod expr;
mod stmt;

/// Ubicación de un valor evaluado.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Domain {
    /// `eax`
    Int,

    /// `st0`
    Float,
}

impl From<Type> for Domain {
    fn from(typ: Type) -> Self {
        match typ {
            Type::Double => Domain::Float,
            _ => Domain::Int,
        }
    }
}

type Emit<T = ()> = Result<T, fmt::Error>;

/// Epílogo compartido de `_start` y de cada función.
const EXIT: &str = ".exit";

/// Emite un programa completo.
pub fn emit<W: io::Write>(program: &ast::Program, output: &mut W) -> io::Result<()> {
    let text = generate(program)
        .map_err(|_| io::Error::new(io::ErrorKind::Other, "assembly formatting failed"))?;

    output.write_all(text.as_bytes())
}

fn generate(program: &ast::Program) -> Emit<String> {
    let mut emitter = Emitter::new(program);

    emitter.table.push_scope();
    emitter.start(program)?;

    let functions = program.statements.iter().filter_map(|statement| match &statement.kind {
        StatementKind::Function(function) => Some(function),
        _ => None,
    });

    for function in functions {
        emitter.function(function)?;
    }

    emitter.finish()
}

#[derive(Clone, Debug)]
struct Signature {
    ret: Type,
    parameters: Vec<Type>,
}

#[derive(Clone, Debug)]
enum Place {
    /// Etiqueta en `.bss`.
    Global(String),

    /// Desplazamiento relativo a `ebp`.
    Frame(i32),
}

#[derive(Clone, Debug)]
struct Slot {
    typ: Type,
    place: Place,
}

impl Slot {
    /// Operando de memoria del valor, o del elemento indexado por `ecx`.
    fn address(&self, indexed: bool) -> String {
        let width = match self.typ.size() {
            1 => "byte",
            8 => "qword",
            _ => "dword",
        };

        let index = if indexed {
            format!(" + ecx*{}", self.typ.size().max(1))
        } else {
            String::new()
        };

        match &self.place {
            Place::Global(label) => format!("{} [{}{}]", width, label, index),
            Place::Frame(offset) if *offset < 0 => {
                format!("{} [ebp{} - {}]", width, index, -offset)
            }

            Place::Frame(offset) => format!("{} [ebp{} + {}]", width, index, offset),
        }
    }
}

/// Contexto de la función en emisión.
struct Frame {
    ret: Type,

    /// Bytes reservados para locales hasta el momento.
    size: u32,
}

/// Destinos de `continue` y `break`.
struct Loop {
    next: String,
    end: String,
}

struct Emitter {
    text: String,
    data: String,
    bss: String,

    signatures: HashMap<Identifier, Signature>,
    defined: BTreeSet<Identifier>,
    externs: BTreeSet<Identifier>,

    table: SymbolTable<Slot>,
    reserved: HashMap<Identifier, Vec<(Type, u32, String)>>,
    constants: HashMap<String, String>,

    frame: Option<Frame>,
    loops: Vec<Loop>,
    labels: u32,
}

impl Emitter {
    fn new(program: &ast::Program) -> Self {
        let mut signatures = HashMap::new();
        let mut defined = BTreeSet::new();

        for statement in &program.statements {
            let (ret, name, parameters) = match &statement.kind {
                StatementKind::Prototype(prototype) => {
                    (&prototype.ret, &prototype.name, &prototype.parameters)
                }

                StatementKind::Function(function) => {
                    defined.insert(function.name.as_ref().clone());
                    (&function.ret, &function.name, &function.parameters)
                }

                _ => continue,
            };

            let signature = Signature {
                ret: resolve(ret.as_ref()),
                parameters: parameters
                    .iter()
                    .map(|parameter| resolve(parameter.typ.as_ref()))
                    .filter(|typ| *typ != Type::Void)
                    .collect(),
            };

            signatures.insert(name.as_ref().clone(), signature);
        }

        Emitter {
            text: String::new(),
            data: String::new(),
            bss: String::new(),
            signatures,
            defined,
            externs: BTreeSet::new(),
            table: SymbolTable::new(),
            reserved: HashMap::new(),
            constants: HashMap::new(),
            frame: None,
            loops: Vec::new(),
            labels: 0,
        }
    }

    fn output(&mut self) -> &mut String {
        &mut self.text
    }

    fn label(&mut self) -> String {
        let label = format!(".L{}", self.labels);
        self.labels += 1;
        label
    }

    fn set_label(&mut self, label: &str) -> Emit {
        writeln!(self.output(), "{}:", label)
    }

    /// Código de nivel superior, punto de entrada del ejecutable.
    fn start(&mut self, program: &ast::Program) -> Emit {
        writeln!(self.output(), "_start:")?;

        for statement in &program.statements {
            self.statement(statement)?;
        }

        if self.defined.contains("main") {
            let domain = self.call_by_name(&Identifier::from("main"), &[])?;
            if domain == Some(Domain::Float) {
                self.float_to_eax()?;
            }
        } else {
            emit!(self, "mov", "eax, 0")?;
        }

        self.set_label(EXIT)?;
        emit!(self, "mov", "ebx, eax")?;
        emit!(self, "mov", "eax, 1")?;
        emit!(self, "int", "0x80")
    }

    fn function(&mut self, function: &ast::Function) -> Emit {
        let name = function.name.as_ref();
        let ret = resolve(function.ret.as_ref());

        let outer = std::mem::take(&mut self.text);
        self.frame = Some(Frame {
            ret,
            size: 0,
        });

        self.table.push_scope();

        let mut offset = 8;
        for parameter in &function.parameters {
            let typ = resolve(parameter.typ.as_ref());
            if let Some(name) = &parameter.name {
                let slot = Slot {
                    typ,
                    place: Place::Frame(offset),
                };

                self.table.declare(name.as_ref().clone(), slot);
            }

            offset += if typ == Type::Double { 8 } else { 4 };
        }

        for statement in &function.body.statements {
            self.statement(statement)?;
        }

        self.table.pop_scope();

        // Retorno por omisión, solo alcanzable sin un `return` explícito
        match ret {
            Type::Double => emit!(self, "fldz")?,
            _ => emit!(self, "mov", "eax, 0")?,
        }

        let body = std::mem::replace(&mut self.text, outer);
        let frame = match self.frame.take() {
            Some(frame) => frame,
            None => return Err(fmt::Error),
        };

        log::debug!("emitting function `{}`, {} bytes of locals", name, frame.size);

        writeln!(self.output(), "\n{}:", name)?;
        emit!(self, "push", "ebp")?;
        emit!(self, "mov", "ebp, esp")?;
        if frame.size > 0 {
            emit!(self, "sub", "esp, {}", frame.size)?;
        }

        self.output().push_str(&body);

        self.set_label(EXIT)?;
        emit!(self, "mov", "esp, ebp")?;
        emit!(self, "pop", "ebp")?;
        emit!(self, "ret")
    }

    /// Ubica almacenamiento para una variable recién declarada.
    fn allocate(&mut self, name: &Identifier, typ: Type, length: Option<u32>) -> Emit<Slot> {
        let count = length.unwrap_or(1).max(1);

        let place = match &mut self.frame {
            Some(frame) => {
                let alignment = if typ == Type::Double { 8 } else { 4 };
                let size = typ.size() * count;

                frame.size = align(frame.size + size, alignment);
                Place::Frame(-(frame.size as i32))
            }

            None => Place::Global(self.reserve(name, typ, count)?),
        };

        Ok(Slot { typ, place })
    }

    /// Reserva en `.bss`. Redeclarar con el mismo tipo reutiliza la reserva.
    fn reserve(&mut self, name: &Identifier, typ: Type, count: u32) -> Emit<String> {
        let previous = self.reserved.entry(name.clone()).or_default();
        if let Some((_, _, label)) = previous
            .iter()
            .find(|(other, length, _)| *other == typ && *length == count)
        {
            return Ok(label.clone());
        }

        let label = match previous.len() {
            0 => format!("v_{}", name),
            n => format!("v_{}_{}", name, n),
        };

        previous.push((typ, count, label.clone()));

        let directive = match typ.size() {
            1 => "resb",
            8 => "resq",
            _ => "resd",
        };

        writeln!(self.bss, "{}:\t{} {}", label, directive, count)?;
        Ok(label)
    }

    /// Etiqueta en `.data` para una constante de punto flotante.
    fn constant(&mut self, text: &str) -> Emit<String> {
        if let Some(label) = self.constants.get(text) {
            return Ok(label.clone());
        }

        let label = format!("_cd{}", self.constants.len());
        let value = if text.starts_with('.') {
            format!("0{}", text)
        } else {
            text.to_owned()
        };

        writeln!(self.data, "{}:\tdq {}", label, value)?;
        self.constants.insert(text.to_owned(), label.clone());

        Ok(label)
    }

    fn finish(self) -> Emit<String> {
        let mut output = String::new();

        writeln!(output, "; generado por minic")?;
        writeln!(output, "bits 32")?;
        writeln!(output, "global _start")?;
        for name in &self.externs {
            writeln!(output, "extern {}", name)?;
        }

        writeln!(output, "\nsection .data")?;
        output.push_str(&self.data);

        writeln!(output, "\nsection .bss")?;
        output.push_str(&self.bss);

        writeln!(output, "\nsection .text")?;
        output.push_str(&self.text);

        Ok(output)
    }
}

/// Un tipo irresoluble ya fue reportado; se trata como `int`.
fn resolve(lexeme: &str) -> Type {
    lexeme.parse().unwrap_or(Type::Int)
}

fn align(value: u32, alignment: u32) -> u32 {
    (value + alignment - 1) / alignment * alignment
}
