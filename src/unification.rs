//! Type unification for SPL
//!
//! Most-general unification over the ground algebra extended with type
//! variables, with an occurs check, plus the substitutions the rest of
//! the compiler threads through the environment.

use crate::types::{FunctionScheme, FunctionUsage, InferenceType};
use std::collections::HashMap;

/// Failure modes of the unification kernel. Callers attach a source range
/// and convert to the user-facing error taxonomy.
#[derive(Debug, Clone, PartialEq)]
pub enum UnifyError {
    /// Constructor shapes do not match
    Mismatch(InferenceType, InferenceType),
    /// Occurs check fired: binding the variable would create an infinite type
    Recursive(usize, InferenceType),
}

/// A finite map from type variable ids to types
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Subst {
    map: HashMap<usize, InferenceType>,
}

impl Subst {
    pub fn empty() -> Self {
        Subst {
            map: HashMap::new(),
        }
    }

    pub fn single(num: usize, replacement: InferenceType) -> Self {
        let mut map = HashMap::new();
        map.insert(num, replacement);
        Subst { map }
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// What the substitution maps `num` to, defaulting to `Var(num)`
    pub fn get(&self, num: usize) -> InferenceType {
        self.map
            .get(&num)
            .cloned()
            .unwrap_or(InferenceType::Var(num))
    }

    /// Apply the substitution to a type
    pub fn apply(&self, t: &InferenceType) -> InferenceType {
        match t {
            InferenceType::Var(n) => self.get(*n),
            InferenceType::Tuple(t1, t2) => {
                InferenceType::tuple(self.apply(t1), self.apply(t2))
            }
            InferenceType::List(inner) => InferenceType::list(self.apply(inner)),
            other => other.clone(),
        }
    }

    pub fn apply_usage(&self, usage: &FunctionUsage) -> FunctionUsage {
        FunctionUsage::new(
            usage.arg_types.iter().map(|t| self.apply(t)).collect(),
            self.apply(&usage.ret_type),
        )
    }

    pub fn apply_scheme(&self, scheme: &FunctionScheme) -> FunctionScheme {
        FunctionScheme::new(scheme.quantified.clone(), self.apply_usage(&scheme.usage))
    }

    /// Left-biased composition: later bindings refined by earlier ones.
    /// `newer.compose(&older)` maps every binding of `older` through
    /// `newer` and unions in `newer`'s own bindings.
    pub fn compose(&self, older: &Subst) -> Subst {
        let mut map = HashMap::new();
        for (n, t) in &older.map {
            map.insert(*n, self.apply(t));
        }
        for (n, t) in &self.map {
            map.insert(*n, t.clone());
        }
        Subst { map }
    }
}

/// Bind variable `num` to `t`, with the occurs check
fn bind_var(num: usize, t: &InferenceType) -> Result<Subst, UnifyError> {
    if let InferenceType::Var(other) = t {
        if *other == num {
            return Ok(Subst::empty());
        }
    }
    if t.contains_var(num) {
        return Err(UnifyError::Recursive(num, t.clone()));
    }
    Ok(Subst::single(num, t.clone()))
}

/// Compute a most-general substitution making `a` and `b` equal
pub fn unify(a: &InferenceType, b: &InferenceType) -> Result<Subst, UnifyError> {
    match (a, b) {
        (InferenceType::Var(n), t) => bind_var(*n, t),
        (t, InferenceType::Var(n)) => bind_var(*n, t),
        (InferenceType::Int, InferenceType::Int)
        | (InferenceType::Bool, InferenceType::Bool)
        | (InferenceType::Char, InferenceType::Char)
        | (InferenceType::Void, InferenceType::Void) => Ok(Subst::empty()),
        (InferenceType::Tuple(a1, a2), InferenceType::Tuple(b1, b2)) => {
            let s1 = unify(a1, b1)?;
            let s2 = unify(&s1.apply(a2), &s1.apply(b2))?;
            Ok(s2.compose(&s1))
        }
        (InferenceType::List(a1), InferenceType::List(b1)) => unify(a1, b1),
        _ => Err(UnifyError::Mismatch(a.clone(), b.clone())),
    }
}
