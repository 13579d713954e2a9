//! Optimización de código intermedio.
//!
//! Dos fases se alternan hasta alcanzar un punto fijo:
//!
//! - [`local`]: plegado y propagación de constantes y eliminación de
//!   subexpresiones comunes, dentro de cada bloque básico.
//! - [`liveness`]: análisis de vida de variables sobre el grafo de flujo
//!   de control reconstruido a partir de etiquetas y saltos, con
//!   eliminación de definiciones muertas.
//!
//! Optimizar una salida ya optimizada no produce cambio alguno.

use std::collections::HashSet;

use crate::ir::{Operand, Program};

pub mod liveness;
pub mod local;

/// Optimiza un programa. La entrada permanece intacta.
pub fn optimize(program: &Program) -> Program {
    let globals: HashSet<Operand> = program.globals.iter().cloned().map(Operand::Var).collect();

    let mut code = program.code.clone();
    for pass in 1.. {
        let folded = local::fold(&mut code, &globals, &program.variables);
        let removed = liveness::eliminate(&mut code, &globals);

        log::debug!(
            "optimizer pass {}: {} instructions (folded: {}, removed: {})",
            pass,
            code.len(),
            folded,
            removed
        );

        if !folded && removed == 0 {
            break;
        }
    }

    Program {
        globals: program.globals.clone(),
        variables: program.variables.clone(),
        code,
    }
}
