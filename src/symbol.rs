//! Tabla de símbolos.
//!
//! Una pila de contextos (scopes) en donde el fondo es el contexto global.
//! Las búsquedas recorren la pila desde el contexto más interno, lo cual
//! implementa sombreado léxico. Ninguna operación falla: la ausencia de un
//! símbolo se representa con `None` o `false` y es quien llama el que
//! decide qué significa en contexto.
//!
//! La tabla es genérica sobre el contenido de cada entrada. El análisis
//! semántico almacena [`Symbol`]; la generación de código reutiliza la
//! misma disciplina de contextos para ubicar almacenamiento.

use std::collections::HashMap;

use crate::{ast::Identifier, source::Position, types::Type};

/// Una declaración, variable o función.
#[derive(Clone, Debug)]
pub struct Symbol {
    pub name: Identifier,

    /// Tipo declarado. Para funciones es el tipo de retorno.
    pub typ: Type,

    pub initialized: bool,
    pub used: bool,
    pub declared_at: Position,
    pub kind: SymbolKind,
}

#[derive(Clone, Debug)]
pub enum SymbolKind {
    Variable {
        /// Longitud, si se trata de un arreglo.
        length: Option<u32>,
        parameter: bool,
    },

    Function(Signature),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Signature {
    pub parameters: Vec<Type>,

    /// Los prototipos pueden omitir nombres de parámetros.
    pub names: Vec<Option<Identifier>>,

    /// `false` mientras solo exista un prototipo.
    pub defined: bool,
}

impl Symbol {
    pub fn variable(name: Identifier, typ: Type, declared_at: Position) -> Self {
        Symbol {
            name,
            typ,
            initialized: false,
            used: false,
            declared_at,
            kind: SymbolKind::Variable {
                length: None,
                parameter: false,
            },
        }
    }

    pub fn function(name: Identifier, ret: Type, signature: Signature, at: Position) -> Self {
        Symbol {
            name,
            typ: ret,
            initialized: true,
            used: false,
            declared_at: at,
            kind: SymbolKind::Function(signature),
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self.kind, SymbolKind::Function(_))
    }

    pub fn signature(&self) -> Option<&Signature> {
        match &self.kind {
            SymbolKind::Function(signature) => Some(signature),
            SymbolKind::Variable { .. } => None,
        }
    }

    pub fn length(&self) -> Option<u32> {
        match self.kind {
            SymbolKind::Variable { length, .. } => length,
            SymbolKind::Function(_) => None,
        }
    }

    pub fn is_parameter(&self) -> bool {
        matches!(
            self.kind,
            SymbolKind::Variable {
                parameter: true,
                ..
            }
        )
    }
}

/// Un contexto: nombres únicos, sin orden de inserción.
pub struct Scope<T> {
    symbols: HashMap<Identifier, T>,
}

impl<T> Scope<T> {
    pub fn get(&self, name: &str) -> Option<&T> {
        self.symbols.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &T> {
        self.symbols.values()
    }

    pub fn into_symbols(self) -> impl Iterator<Item = T> {
        self.symbols.into_values()
    }
}

impl<T> Default for Scope<T> {
    fn default() -> Self {
        Scope {
            symbols: HashMap::new(),
        }
    }
}

pub struct SymbolTable<T> {
    scopes: Vec<Scope<T>>,
}

impl<T> SymbolTable<T> {
    pub fn new() -> Self {
        SymbolTable { scopes: Vec::new() }
    }

    /// Cantidad de contextos vivos.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Indica si el contexto actual es el global (raíz).
    pub fn is_global_scope(&self) -> bool {
        self.scopes.len() == 1
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
        log::trace!("push scope, depth={}", self.scopes.len());
    }

    /// Remueve el contexto actual y lo retorna para inspección.
    pub fn pop_scope(&mut self) -> Option<Scope<T>> {
        let scope = self.scopes.pop();
        if scope.is_some() {
            log::trace!("pop scope, depth={}", self.scopes.len());
        }

        scope
    }

    /// Declara en el contexto actual.
    ///
    /// Si el nombre ya existe en este contexto, no se hace nada y se
    /// retorna `false`. Es responsabilidad de quien llama verificar con
    /// [`SymbolTable::exists_in_current_scope()`] y reportar el error.
    pub fn declare(&mut self, name: Identifier, symbol: T) -> bool {
        match self.scopes.last_mut() {
            Some(scope) => Self::insert(scope, name, symbol),
            None => false,
        }
    }

    /// Declara en el contexto global sin importar la profundidad actual.
    ///
    /// Existe para funciones: así el cuerpo de una función, que abre su
    /// propio contexto, puede resolver llamadas recursivas a sí misma.
    pub fn declare_global(&mut self, name: Identifier, symbol: T) -> bool {
        match self.scopes.first_mut() {
            Some(scope) => Self::insert(scope, name, symbol),
            None => false,
        }
    }

    pub fn exists_in_current_scope(&self, name: &str) -> bool {
        self.scopes
            .last()
            .map(|scope| scope.contains(name))
            .unwrap_or(false)
    }

    /// Búsqueda desde el contexto más interno hacia el global.
    pub fn lookup(&self, name: &str) -> Option<&T> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut T> {
        self.scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.symbols.get_mut(name))
    }

    pub fn lookup_global(&self, name: &str) -> Option<&T> {
        self.scopes.first().and_then(|scope| scope.get(name))
    }

    pub fn lookup_global_mut(&mut self, name: &str) -> Option<&mut T> {
        self.scopes
            .first_mut()
            .and_then(|scope| scope.symbols.get_mut(name))
    }

    /// Visita cada símbolo de cada contexto vivo.
    pub fn for_each_symbol<F>(&self, mut visit: F)
    where
        F: FnMut(&T),
    {
        for scope in &self.scopes {
            scope.symbols().for_each(&mut visit);
        }
    }

    fn insert(scope: &mut Scope<T>, name: Identifier, symbol: T) -> bool {
        if scope.contains(name.as_ref()) {
            return false;
        }

        log::trace!("declare `{}`", name);
        scope.symbols.insert(name, symbol);
        true
    }
}

impl<T> Default for SymbolTable<T> {
    fn default() -> Self {
        SymbolTable::new()
    }
}
