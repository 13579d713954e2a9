/// Escribe una instrucción ensamblador en la salida de un emisor.
///
/// El mnemónico se alinea en una columna fija; los operandos se
/// formatean como en `format!()`.
macro_rules! emit {
    ($emitter:expr, $opcode:expr) => {
        writeln!($emitter.output(), "\t{}", $opcode)
    };

    ($emitter:expr, $opcode:expr, $($format:tt)*) => {{
        write!($emitter.output(), "\t{:8}", $opcode)?;
        writeln!($emitter.output(), $($format)*)
    }};
}
