//! Inference type algebra for SPL
//!
//! The ground types extended with numbered type variables, plus the
//! function schemes stored in the typing environment.

/// A type as manipulated by the inference engine
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InferenceType {
    Int,
    Bool,
    Char,
    Void,
    Tuple(Box<InferenceType>, Box<InferenceType>),
    List(Box<InferenceType>),
    /// Numbered type variable
    Var(usize),
}

impl InferenceType {
    pub fn tuple(t1: InferenceType, t2: InferenceType) -> Self {
        InferenceType::Tuple(Box::new(t1), Box::new(t2))
    }

    pub fn list(t: InferenceType) -> Self {
        InferenceType::List(Box::new(t))
    }

    pub fn is_type_var(&self) -> bool {
        matches!(self, InferenceType::Var(_))
    }

    /// Int, Bool and Char live in a single machine word and compare with
    /// one instruction
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            InferenceType::Int | InferenceType::Bool | InferenceType::Char
        )
    }

    /// Does `Var(num)` occur anywhere in this type?
    pub fn contains_var(&self, num: usize) -> bool {
        match self {
            InferenceType::Var(n) => *n == num,
            InferenceType::Tuple(t1, t2) => t1.contains_var(num) || t2.contains_var(num),
            InferenceType::List(t) => t.contains_var(num),
            _ => false,
        }
    }

    /// Does any type variable occur in this type?
    pub fn contains_any_var(&self) -> bool {
        match self {
            InferenceType::Var(_) => true,
            InferenceType::Tuple(t1, t2) => t1.contains_any_var() || t2.contains_any_var(),
            InferenceType::List(t) => t.contains_any_var(),
            _ => false,
        }
    }

    /// Append every type variable id occurring in this type to `out`
    pub fn collect_vars(&self, out: &mut Vec<usize>) {
        match self {
            InferenceType::Var(n) => out.push(*n),
            InferenceType::Tuple(t1, t2) => {
                t1.collect_vars(out);
                t2.collect_vars(out);
            }
            InferenceType::List(t) => t.collect_vars(out),
            _ => {}
        }
    }
}

impl std::fmt::Display for InferenceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InferenceType::Int => write!(f, "int"),
            InferenceType::Bool => write!(f, "bool"),
            InferenceType::Char => write!(f, "char"),
            InferenceType::Void => write!(f, "void"),
            InferenceType::Tuple(t1, t2) => write!(f, "({}, {})", t1, t2),
            InferenceType::List(t) => write!(f, "[{}]", t),
            InferenceType::Var(n) => write!(f, "v{}", n),
        }
    }
}

/// Argument and return types of one function usage
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionUsage {
    pub arg_types: Vec<InferenceType>,
    pub ret_type: InferenceType,
}

impl FunctionUsage {
    pub fn new(arg_types: Vec<InferenceType>, ret_type: InferenceType) -> Self {
        FunctionUsage {
            arg_types,
            ret_type,
        }
    }
}

impl std::fmt::Display for FunctionUsage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let args: Vec<String> = self.arg_types.iter().map(|t| t.to_string()).collect();
        write!(f, "[{}] -> {}", args.join(", "), self.ret_type)
    }
}

/// A function signature in the environment: a usage quantified over a
/// list of type variable ids
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionScheme {
    pub quantified: Vec<usize>,
    pub usage: FunctionUsage,
}

impl FunctionScheme {
    pub fn new(quantified: Vec<usize>, usage: FunctionUsage) -> Self {
        FunctionScheme { quantified, usage }
    }

    /// Append the free (non-quantified) type variables of this scheme to `out`
    pub fn collect_free_vars(&self, out: &mut Vec<usize>) {
        let mut vars = Vec::new();
        for t in &self.usage.arg_types {
            t.collect_vars(&mut vars);
        }
        self.usage.ret_type.collect_vars(&mut vars);
        out.extend(vars.into_iter().filter(|v| !self.quantified.contains(v)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let t = InferenceType::tuple(
            InferenceType::Int,
            InferenceType::list(InferenceType::Var(3)),
        );
        assert_eq!(t.to_string(), "(int, [v3])");
    }

    #[test]
    fn test_contains_var() {
        let t = InferenceType::list(InferenceType::tuple(
            InferenceType::Var(1),
            InferenceType::Bool,
        ));
        assert!(t.contains_var(1));
        assert!(!t.contains_var(2));
        assert!(t.contains_any_var());
        assert!(!InferenceType::Int.contains_any_var());
    }

    #[test]
    fn test_collect_vars() {
        let t = InferenceType::tuple(InferenceType::Var(1), InferenceType::Var(2));
        let mut vars = Vec::new();
        t.collect_vars(&mut vars);
        assert_eq!(vars, vec![1, 2]);
    }

    #[test]
    fn test_scheme_free_vars() {
        let scheme = FunctionScheme::new(
            vec![1],
            FunctionUsage::new(
                vec![InferenceType::Var(1), InferenceType::Var(2)],
                InferenceType::Var(1),
            ),
        );
        let mut free = Vec::new();
        scheme.collect_free_vars(&mut free);
        assert_eq!(free, vec![2]);
    }

    #[test]
    fn test_scalar() {
        assert!(InferenceType::Int.is_scalar());
        assert!(InferenceType::Char.is_scalar());
        assert!(!InferenceType::Void.is_scalar());
        assert!(!InferenceType::list(InferenceType::Int).is_scalar());
    }
}
