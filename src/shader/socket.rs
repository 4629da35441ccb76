//! Shader node sockets.

use glam::Vec3;

/// Value type carried by a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketType {
    Float,
    Int,
    Color,
    Vector,
    String,
    Closure,
}

impl SocketType {
    /// Whether an output of type `self` may feed an input of type `input`.
    ///
    /// Closures only connect to closures; every data type converts into every
    /// other data type.
    pub fn connects_to(self, input: SocketType) -> bool {
        match (self, input) {
            (SocketType::Closure, SocketType::Closure) => true,
            (SocketType::Closure, _) | (_, SocketType::Closure) => false,
            (SocketType::String, other) | (other, SocketType::String) => other == SocketType::String,
            _ => true,
        }
    }
}

/// Static description of a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketSpec {
    pub name: &'static str,
    pub ty: SocketType,
}

impl SocketSpec {
    pub const fn new(name: &'static str, ty: SocketType) -> Self {
        Self { name, ty }
    }
}

/// Value held by an unconnected input socket.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketValue {
    Float(f32),
    Int(i32),
    Color(Vec3),
    Vector(Vec3),
    String(String),
    Closure,
}

impl SocketValue {
    /// Zero value of `ty`.
    pub fn default_for(ty: SocketType) -> Self {
        match ty {
            SocketType::Float => Self::Float(0.0),
            SocketType::Int => Self::Int(0),
            SocketType::Color => Self::Color(Vec3::ZERO),
            SocketType::Vector => Self::Vector(Vec3::ZERO),
            SocketType::String => Self::String(String::new()),
            SocketType::Closure => Self::Closure,
        }
    }

    pub fn ty(&self) -> SocketType {
        match self {
            Self::Float(_) => SocketType::Float,
            Self::Int(_) => SocketType::Int,
            Self::Color(_) => SocketType::Color,
            Self::Vector(_) => SocketType::Vector,
            Self::String(_) => SocketType::String,
            Self::Closure => SocketType::Closure,
        }
    }
}

/// An input socket of a node instance.
#[derive(Debug, Clone, PartialEq)]
pub struct InputSocket {
    pub spec: SocketSpec,
    pub value: SocketValue,
}

impl InputSocket {
    pub fn new(spec: SocketSpec) -> Self {
        Self {
            spec,
            value: SocketValue::default_for(spec.ty),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_only_connects_to_closure() {
        assert!(SocketType::Closure.connects_to(SocketType::Closure));
        assert!(!SocketType::Closure.connects_to(SocketType::Color));
        assert!(!SocketType::Float.connects_to(SocketType::Closure));
        assert!(SocketType::Color.connects_to(SocketType::Float));
        assert!(!SocketType::String.connects_to(SocketType::Float));
    }

    #[test]
    fn test_defaults_match_type() {
        for ty in [SocketType::Float, SocketType::Vector, SocketType::Closure] {
            assert_eq!(SocketValue::default_for(ty).ty(), ty);
        }
    }
}
