//! Sistema de tipos.
//!
//! El lenguaje tiene un conjunto cerrado de tipos primitivos. Todas las
//! decisiones de tipos (promoción, compatibilidad de asignación) se toman
//! sobre [`Type`]; los lexemas de tipo solo se comparan una vez, al
//! resolverlos con [`Type::from_str()`].

use std::{
    fmt::{self, Display},
    str::FromStr,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Int,
    Double,
    Char,
    Bool,
}

impl Type {
    /// Todos los tipos salvo `void` participan en aritmética.
    pub fn is_numeric(self) -> bool {
        self != Type::Void
    }

    /// Tipos aceptables como índice de arreglo.
    pub fn is_integral(self) -> bool {
        matches!(self, Type::Int | Type::Char | Type::Bool)
    }

    /// Orden total de promoción: `double > int > bool > char`.
    fn rank(self) -> Option<u8> {
        match self {
            Type::Void => None,
            Type::Char => Some(0),
            Type::Bool => Some(1),
            Type::Int => Some(2),
            Type::Double => Some(3),
        }
    }

    /// Tipo resultante de una operación aritmética binaria.
    pub fn promote(self, other: Type) -> Option<Type> {
        let (left, right) = (self.rank()?, other.rank()?);
        Some(if left >= right { self } else { other })
    }

    /// Determina si un valor de tipo `value` puede almacenarse en un
    /// destino de este tipo.
    pub fn accepts(self, value: Type) -> bool {
        use Type::*;

        match (self, value) {
            (Void, _) | (_, Void) => false,
            (dest, value) if dest == value => true,
            (Double, Int) | (Double, Char) => true,
            (Int, Char) | (Int, Bool) => true,
            (Bool, Char) | (Bool, Int) => true,
            _ => false,
        }
    }

    /// Tamaño de almacenamiento, en bytes.
    pub fn size(self) -> u32 {
        match self {
            Type::Void => 0,
            Type::Char => 1,
            Type::Int | Type::Bool => 4,
            Type::Double => 8,
        }
    }
}

impl FromStr for Type {
    type Err = ();

    fn from_str(lexeme: &str) -> Result<Self, Self::Err> {
        const NAMES: [(&str, Type); 5] = [
            ("int", Type::Int),
            ("double", Type::Double),
            ("char", Type::Char),
            ("bool", Type::Bool),
            ("void", Type::Void),
        ];

        let lexeme = lexeme.trim();
        NAMES
            .iter()
            .find(|(name, _)| unicase::eq_ascii(lexeme, *name))
            .map(|(_, typ)| *typ)
            .ok_or(())
    }
}

impl Display for Type {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => fmt.write_str("void"),
            Type::Int => fmt.write_str("int"),
            Type::Double => fmt.write_str("double"),
            Type::Char => fmt.write_str("char"),
            Type::Bool => fmt.write_str("bool"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Type::*;

    #[test]
    fn promotion_picks_the_wider_type() {
        assert_eq!(Int.promote(Double), Some(Double));
        assert_eq!(Char.promote(Int), Some(Int));
        assert_eq!(Bool.promote(Char), Some(Bool));
        assert_eq!(Char.promote(Char), Some(Char));
        assert_eq!(Void.promote(Int), None);
    }

    #[test]
    fn assignment_is_narrower_than_promotion() {
        assert!(Double.accepts(Int));
        assert!(Double.accepts(Char));
        assert!(!Double.accepts(Bool));
        assert!(!Int.accepts(Double));
        assert!(Int.accepts(Char));
        assert!(Int.accepts(Bool));
        assert!(Bool.accepts(Int));
        assert!(!Char.accepts(Int));
        assert!(Char.accepts(Char));
        assert!(!Void.accepts(Void));
    }

    #[test]
    fn type_names_resolve_case_insensitively() {
        assert_eq!("int".parse(), Ok(Int));
        assert_eq!("DOUBLE".parse(), Ok(Double));
        assert_eq!(" Char ".parse(), Ok(Char));
        assert_eq!("string".parse::<Type>(), Err(()));
    }
}
