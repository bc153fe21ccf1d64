//! Type system for Vic
//!
//! A small structural model: two unsigned integer widths, bool, void,
//! string, sized/unsized arrays, enums and function types. Aliases keep
//! their name for diagnostics but compare and behave as their target.

/// Resolved type of a symbol or expression.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeInfo {
    /// 8-bit unsigned integer
    Byte,
    /// 16-bit unsigned integer
    Word,
    /// 1-byte boolean (0 or 1)
    Bool,
    /// No value; not assignable
    Void,
    /// Read-only text; not assignable
    Str,
    /// `T[n]` (sized) or `T[]` (unsized)
    Array {
        element: Box<TypeInfo>,
        count: Option<u32>,
    },
    /// Named enumeration; members keep declaration order
    Enum {
        name: String,
        members: Vec<(String, u32)>,
    },
    /// Function signature
    Function {
        params: Vec<TypeInfo>,
        param_names: Vec<String>,
        return_type: Box<TypeInfo>,
    },
    /// A named alias, transparent everywhere except in messages
    Alias {
        name: String,
        target: Box<TypeInfo>,
    },
}

impl TypeInfo {
    pub const BYTE: TypeInfo = TypeInfo::Byte;
    pub const WORD: TypeInfo = TypeInfo::Word;
    pub const BOOL: TypeInfo = TypeInfo::Bool;
    pub const VOID: TypeInfo = TypeInfo::Void;
    pub const STRING: TypeInfo = TypeInfo::Str;

    pub fn array(element: TypeInfo, count: Option<u32>) -> TypeInfo {
        TypeInfo::Array {
            element: Box::new(element),
            count,
        }
    }

    /// Strip alias wrappers down to the underlying type.
    pub fn canonical(&self) -> &TypeInfo {
        let mut ty = self;
        while let TypeInfo::Alias { target, .. } = ty {
            ty = target;
        }
        ty
    }

    /// Size in bytes, or `None` when the size is not statically known
    /// (unsized arrays, strings) or not meaningful (functions).
    pub fn size(&self) -> Option<u32> {
        match self.canonical() {
            TypeInfo::Byte | TypeInfo::Bool => Some(1),
            TypeInfo::Word => Some(2),
            TypeInfo::Void => Some(0),
            TypeInfo::Str => None,
            TypeInfo::Array { element, count } => {
                let count = (*count)?;
                Some(element.size()? * count)
            }
            TypeInfo::Enum { members, .. } => {
                let max = members.iter().map(|(_, v)| *v).max().unwrap_or(0);
                Some(if max > 0xFF { 2 } else { 1 })
            }
            TypeInfo::Function { .. } => None,
            TypeInfo::Alias { .. } => unreachable!("canonical strips aliases"),
        }
    }

    /// All Vic integer types are unsigned.
    pub fn is_signed(&self) -> bool {
        false
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.canonical(), TypeInfo::Byte | TypeInfo::Word)
    }

    /// Types a value of which can be stored into (used for both variables
    /// and assignment targets).
    pub fn is_assignable(&self) -> bool {
        !matches!(
            self.canonical(),
            TypeInfo::Void | TypeInfo::Str | TypeInfo::Function { .. }
        )
    }

    pub fn is_array(&self) -> bool {
        matches!(self.canonical(), TypeInfo::Array { .. })
    }

    pub fn element_type(&self) -> Option<&TypeInfo> {
        match self.canonical() {
            TypeInfo::Array { element, .. } => Some(element),
            _ => None,
        }
    }

    /// Value width class used for widening: 1 for byte-like, 2 for word.
    fn numeric_width(&self) -> Option<u32> {
        match self.canonical() {
            TypeInfo::Byte | TypeInfo::Bool => Some(1),
            TypeInfo::Word => Some(2),
            TypeInfo::Enum { .. } => self.size(),
            _ => None,
        }
    }

    /// Can a value of `source` type be stored into a slot of this type?
    ///
    /// Widening (`byte` -> `word`, `bool` -> `byte`, enum -> fitting
    /// integer) is implicit; narrowing never is. Arrays require an exact
    /// element match; an unsized array slot accepts any count.
    pub fn assignable_from(&self, source: &TypeInfo) -> bool {
        let target = self.canonical();
        let source = source.canonical();
        if target == source {
            return !matches!(target, TypeInfo::Void | TypeInfo::Function { .. });
        }
        match (target, source) {
            (TypeInfo::Word, TypeInfo::Byte | TypeInfo::Bool) => true,
            (TypeInfo::Byte, TypeInfo::Bool) => true,
            (TypeInfo::Byte | TypeInfo::Word, TypeInfo::Enum { .. }) => {
                source.numeric_width().unwrap_or(2) <= target.numeric_width().unwrap_or(0)
            }
            // Bool slots accept numerics: non-zero is true
            (TypeInfo::Bool, TypeInfo::Byte | TypeInfo::Word) => true,
            (
                TypeInfo::Array {
                    element: te,
                    count: tc,
                },
                TypeInfo::Array {
                    element: se,
                    count: sc,
                },
            ) => {
                if te.canonical() != se.canonical() {
                    return false;
                }
                match (tc, sc) {
                    (None, _) => true,
                    (Some(t), Some(s)) => t == s,
                    (Some(_), None) => false,
                }
            }
            _ => false,
        }
    }

    /// Widened common type of two operands, per the array-literal and
    /// binary-operator rules: bool/byte widen to byte, byte/word to word.
    pub fn common_type(a: &TypeInfo, b: &TypeInfo) -> Option<TypeInfo> {
        let ca = a.canonical();
        let cb = b.canonical();
        if ca == cb {
            return Some(ca.clone());
        }
        let wa = ca.numeric_width()?;
        let wb = cb.numeric_width()?;
        Some(if wa.max(wb) > 1 {
            TypeInfo::Word
        } else {
            TypeInfo::Byte
        })
    }

    /// Value of a member of this enum type.
    pub fn enum_member(&self, name: &str) -> Option<u32> {
        match self.canonical() {
            TypeInfo::Enum { members, .. } => members
                .iter()
                .find(|(member, _)| member == name)
                .map(|(_, value)| *value),
            _ => None,
        }
    }
}

impl std::fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeInfo::Byte => write!(f, "byte"),
            TypeInfo::Word => write!(f, "word"),
            TypeInfo::Bool => write!(f, "bool"),
            TypeInfo::Void => write!(f, "void"),
            TypeInfo::Str => write!(f, "string"),
            TypeInfo::Array { element, count } => match count {
                Some(n) => write!(f, "{element}[{n}]"),
                None => write!(f, "{element}[]"),
            },
            TypeInfo::Enum { name, .. } => write!(f, "{name}"),
            TypeInfo::Function {
                params,
                return_type,
                ..
            } => {
                write!(f, "function(")?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{param}")?;
                }
                write!(f, "): {return_type}")
            }
            TypeInfo::Alias { name, .. } => write!(f, "{name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes() {
        assert_eq!(TypeInfo::Byte.size(), Some(1));
        assert_eq!(TypeInfo::Word.size(), Some(2));
        assert_eq!(TypeInfo::Bool.size(), Some(1));
        assert_eq!(TypeInfo::Void.size(), Some(0));
        assert_eq!(TypeInfo::Str.size(), None);
        assert_eq!(TypeInfo::array(TypeInfo::Word, Some(5)).size(), Some(10));
        assert_eq!(TypeInfo::array(TypeInfo::Byte, None).size(), None);
    }

    #[test]
    fn test_widening_rules() {
        assert!(TypeInfo::Word.assignable_from(&TypeInfo::Byte));
        assert!(!TypeInfo::Byte.assignable_from(&TypeInfo::Word));
        assert!(TypeInfo::Byte.assignable_from(&TypeInfo::Bool));
        assert!(TypeInfo::Word.assignable_from(&TypeInfo::Word));
    }

    #[test]
    fn test_void_and_string_not_assignable() {
        assert!(!TypeInfo::Void.is_assignable());
        assert!(!TypeInfo::Str.is_assignable());
        assert!(!TypeInfo::Void.assignable_from(&TypeInfo::Void));
    }

    #[test]
    fn test_array_assignability() {
        let byte3 = TypeInfo::array(TypeInfo::Byte, Some(3));
        let byte4 = TypeInfo::array(TypeInfo::Byte, Some(4));
        let word3 = TypeInfo::array(TypeInfo::Word, Some(3));
        let byte_any = TypeInfo::array(TypeInfo::Byte, None);
        assert!(byte3.assignable_from(&byte3));
        assert!(!byte3.assignable_from(&byte4));
        // Element types never coerce inside arrays
        assert!(!word3.assignable_from(&byte3));
        assert!(byte_any.assignable_from(&byte3));
        assert!(!byte3.assignable_from(&byte_any));
    }

    #[test]
    fn test_alias_transparent() {
        let address = TypeInfo::Alias {
            name: "Address".to_string(),
            target: Box::new(TypeInfo::Word),
        };
        assert_eq!(address.canonical(), &TypeInfo::Word);
        assert_eq!(address.size(), Some(2));
        assert!(address.assignable_from(&TypeInfo::Byte));
        assert!(TypeInfo::Word.assignable_from(&address));
        assert_eq!(address.to_string(), "Address");
    }

    #[test]
    fn test_common_type() {
        assert_eq!(
            TypeInfo::common_type(&TypeInfo::Bool, &TypeInfo::Byte),
            Some(TypeInfo::Byte)
        );
        assert_eq!(
            TypeInfo::common_type(&TypeInfo::Byte, &TypeInfo::Word),
            Some(TypeInfo::Word)
        );
        assert_eq!(
            TypeInfo::common_type(&TypeInfo::Byte, &TypeInfo::Byte),
            Some(TypeInfo::Byte)
        );
        assert_eq!(TypeInfo::common_type(&TypeInfo::Byte, &TypeInfo::Str), None);
    }

    #[test]
    fn test_enum_members_and_size() {
        let direction = TypeInfo::Enum {
            name: "Direction".to_string(),
            members: vec![
                ("UP".to_string(), 0),
                ("DOWN".to_string(), 1),
            ],
        };
        assert_eq!(direction.enum_member("DOWN"), Some(1));
        assert_eq!(direction.enum_member("LEFT"), None);
        assert_eq!(direction.size(), Some(1));

        let wide = TypeInfo::Enum {
            name: "Wide".to_string(),
            members: vec![("BIG".to_string(), 0x1234)],
        };
        assert_eq!(wide.size(), Some(2));
        // A byte slot cannot hold a word-sized enum
        assert!(!TypeInfo::Byte.assignable_from(&wide));
        assert!(TypeInfo::Word.assignable_from(&wide));
    }

    #[test]
    fn test_display() {
        assert_eq!(TypeInfo::array(TypeInfo::Byte, Some(8)).to_string(), "byte[8]");
        assert_eq!(TypeInfo::array(TypeInfo::Word, None).to_string(), "word[]");
        let f = TypeInfo::Function {
            params: vec![TypeInfo::Byte, TypeInfo::Word],
            param_names: vec!["x".to_string(), "addr".to_string()],
            return_type: Box::new(TypeInfo::Void),
        };
        assert_eq!(f.to_string(), "function(byte, word): void");
    }
}
