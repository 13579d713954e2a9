//! Núcleo de un compilador para un lenguaje imperativo pequeño, similar a C.
//!
//! # Entrada
//! El compilador recibe un árbol sintáctico ya construido, descrito en
//! [`ast`]. Los analizadores léxico y sintáctico quedan fuera de este
//! crate; las pruebas y los front ends construyen árboles con
//! [`ast::build`].
//!
//! # Front end
//! El árbol se somete a análisis semántico en [`semantic`], que resuelve
//! nombres con la tabla de símbolos de [`symbol`], verifica tipos según
//! [`types`] y acumula hallazgos en un registro de [`error`]. Ningún
//! hallazgo detiene la compilación: quien invoca debe revisar el registro
//! antes de confiar en los artefactos generados.
//!
//! # Middle end
//! [`irgen`] reduce el árbol a código de tres direcciones, descrito en
//! [`ir`]. [`opt`] aplica plegado de constantes, eliminación de
//! subexpresiones comunes y eliminación de código muerto hasta alcanzar
//! un punto fijo.
//!
//! # Back end
//! [`codegen`] emite ensamblador NASM para x86 de 32 bits, con los
//! valores `double` en la pila de la FPU x87.

use std::{fs, path::Path};

use anyhow::{self, Context};
use bitflags::bitflags;

#[macro_use]
mod macros;

pub mod ast;
pub mod codegen;
pub mod error;
pub mod ir;
pub mod irgen;
pub mod opt;
pub mod semantic;
pub mod source;
pub mod symbol;
pub mod types;

use error::Diagnostics;
use semantic::Statistics;

bitflags! {
    /// Fases opcionales de la compilación.
    pub struct Options: u32 {
        /// Optimizar el código intermedio. Sin esta opción, el artefacto
        /// optimizado es una copia del código sin optimizar.
        const OPTIMIZE = 0x01;

        /// Generar ensamblador.
        const ASSEMBLY = 0x02;
    }
}

impl Default for Options {
    fn default() -> Self {
        Options::all()
    }
}

/// Resultado de compilar una unidad de traducción.
#[derive(Debug)]
pub struct Compilation {
    pub diagnostics: Diagnostics,
    pub statistics: Statistics,
    pub ir: ir::Program,
    pub optimized: ir::Program,
    pub assembly: Option<String>,
}

impl Compilation {
    /// Indica si el análisis no reportó errores.
    pub fn succeeded(&self) -> bool {
        !self.diagnostics.has_errors()
    }

    /// Escribe los artefactos en `directory`: `<stem>.ir`, `<stem>.opt.ir`
    /// y, si se generó, `<stem>.asm`.
    pub fn write_to(&self, directory: &Path, stem: &str) -> anyhow::Result<()> {
        fs::create_dir_all(directory)
            .with_context(|| format!("Failed to create directory: {}", directory.display()))?;

        let write = |extension: &str, contents: String| -> anyhow::Result<()> {
            let path = directory.join(format!("{}.{}", stem, extension));
            fs::write(&path, contents)
                .with_context(|| format!("Failed to write artifact: {}", path.display()))
        };

        write("ir", self.ir.to_string())?;
        write("opt.ir", self.optimized.to_string())?;

        if let Some(assembly) = &self.assembly {
            write("asm", assembly.clone())?;
        }

        Ok(())
    }
}

/// Compila un programa completo.
///
/// Los hallazgos semánticos no interrumpen el proceso; solo una falla al
/// dar formato al ensamblador produce un error.
pub fn compile(program: &ast::Program, options: Options) -> anyhow::Result<Compilation> {
    let mut diagnostics = Diagnostics::new();
    let statistics = semantic::analyze(program, &mut diagnostics);

    let ir = irgen::generate(program);
    let optimized = if options.contains(Options::OPTIMIZE) {
        opt::optimize(&ir)
    } else {
        ir.clone()
    };

    log::debug!(
        "intermediate code: {} instructions, {} after optimization",
        ir.code.len(),
        optimized.code.len()
    );

    let assembly = if options.contains(Options::ASSEMBLY) {
        let mut output = Vec::new();
        codegen::emit(program, &mut output).context("Failed to emit assembly")?;

        Some(String::from_utf8(output).context("Emitted assembly is not valid UTF-8")?)
    } else {
        None
    };

    Ok(Compilation {
        diagnostics,
        statistics,
        ir,
        optimized,
        assembly,
    })
}
