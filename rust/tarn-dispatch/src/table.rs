//! Per-name overload tables and signature matching.

use crate::signature::{Argument, Parameter, Signature, BLING, VARNAME};
use crate::type_system::TypeSystem;
use std::collections::BTreeMap;
use tarn_core::diagnostics::Token;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("no function called '{0}'")]
    Keyword(String),
    #[error("no overload of '{0}' fits the arguments")]
    Sig(String),
}

impl ResolveError {
    pub fn code(&self) -> &'static str {
        match self {
            ResolveError::Keyword(_) => "keyword",
            ResolveError::Sig(_) => "sig",
        }
    }
}

/// One overload: its signature and the code address of its body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    pub sig: Signature,
    pub private: bool,
    pub entry: u32,
    pub token: Token,
}

impl Function {
    pub fn new(name: &str, sig: Signature, entry: u32) -> Self {
        Self {
            name: name.to_string(),
            sig,
            private: false,
            entry,
            token: Token::default(),
        }
    }

    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }

    pub fn at(mut self, token: Token) -> Self {
        self.token = token;
        self
    }
}

/// Overloads by name, each list in the order the front end supplied
/// (most specific first).
#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    functions: BTreeMap<String, Vec<Function>>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, f: Function) {
        self.functions.entry(f.name.clone()).or_default().push(f);
    }

    pub fn get(&self, name: &str) -> Option<&[Function]> {
        self.functions.get(name).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<Function>)> {
        self.functions.iter()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// The first overload whose signature fits. Private overloads are
    /// invisible to interactive lookups.
    pub fn find(
        &self,
        name: &str,
        args: &[Argument],
        from_repl: bool,
        ts: &TypeSystem,
    ) -> Result<&Function, ResolveError> {
        let overloads = self
            .functions
            .get(name)
            .ok_or_else(|| ResolveError::Keyword(name.to_string()))?;
        overloads
            .iter()
            .find(|f| params_fit_sig(&f.sig, args, ts) && !(from_repl && f.private))
            .ok_or_else(|| ResolveError::Sig(name.to_string()))
    }
}

fn param_accepts(p: &Parameter, arg: &Argument, ts: &TypeSystem) -> bool {
    match p.ty.as_str() {
        VARNAME => true,
        BLING => arg.bling.as_deref() == Some(p.name.as_str()),
        ty => arg.ty == ty || ts.points_to(&arg.ty, ty),
    }
}

/// Whether an argument list fits a signature. A trailing `tuple` or `any`
/// parameter takes any number of arguments, including none.
pub fn params_fit_sig(sig: &Signature, args: &[Argument], ts: &TypeSystem) -> bool {
    let params = sig.params();
    let Some(last) = params.last() else {
        return args.is_empty();
    };
    if args.len() > params.len() && !last.is_variadic() {
        return false;
    }
    if args.len() < params.len() && !(args.len() + 1 == params.len() && last.is_variadic()) {
        return false;
    }
    for (i, arg) in args.iter().enumerate() {
        let p = &params[i];
        if i == params.len() - 1 && p.is_variadic() {
            return true;
        }
        if !param_accepts(p, arg, ts) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(params: &[(&str, &str)]) -> Signature {
        Signature::new(params.iter().map(|(n, t)| Parameter::new(n, t)).collect())
    }

    fn args(types: &[&str]) -> Vec<Argument> {
        types.iter().map(|t| Argument::of_type(t)).collect()
    }

    #[test]
    fn test_empty_signature_fits_only_empty_args() {
        let ts = TypeSystem::with_builtins();
        assert!(params_fit_sig(&Signature::default(), &[], &ts));
        assert!(!params_fit_sig(&Signature::default(), &args(&["int"]), &ts));
    }

    #[test]
    fn test_exact_and_subtype_match() {
        let ts = TypeSystem::with_builtins();
        let s = sig(&[("x", "int"), ("y", "any")]);
        assert!(params_fit_sig(&s, &args(&["int", "string"]), &ts));
        assert!(!params_fit_sig(&s, &args(&["string", "string"]), &ts));
    }

    #[test]
    fn test_trailing_tuple_takes_any_count() {
        let ts = TypeSystem::with_builtins();
        let s = sig(&[("x", "int"), ("rest", "tuple")]);
        assert!(params_fit_sig(&s, &args(&["int"]), &ts));
        assert!(params_fit_sig(&s, &args(&["int", "bool", "float", "list"]), &ts));
        assert!(!params_fit_sig(&s, &[], &ts));
    }

    #[test]
    fn test_excess_rejected_without_variadic_tail() {
        let ts = TypeSystem::with_builtins();
        let s = sig(&[("x", "int")]);
        assert!(!params_fit_sig(&s, &args(&["int", "int"]), &ts));
        assert!(!params_fit_sig(&s, &[], &ts));
    }

    #[test]
    fn test_bling_matches_literal() {
        let ts = TypeSystem::with_builtins();
        let s = Signature::new(vec![
            Parameter::new("x", "int"),
            Parameter::bling("to"),
            Parameter::new("y", "int"),
        ]);
        let good = vec![Argument::of_type("int"), Argument::bling("to"), Argument::of_type("int")];
        let bad = vec![Argument::of_type("int"), Argument::bling("from"), Argument::of_type("int")];
        assert!(params_fit_sig(&s, &good, &ts));
        assert!(!params_fit_sig(&s, &bad, &ts));
    }

    #[test]
    fn test_varname_matches_anything() {
        let ts = TypeSystem::with_builtins();
        let s = sig(&[("v", "varname"), ("x", "int")]);
        assert!(params_fit_sig(&s, &args(&["label", "int"]), &ts));
    }

    #[test]
    fn test_find_reports_keyword_and_sig() {
        let ts = TypeSystem::with_builtins();
        let mut table = FunctionTable::new();
        table.add(Function::new("double", sig(&[("x", "int")]), 10));
        let e = table.find("triple", &args(&["int"]), false, &ts).unwrap_err();
        assert_eq!(e.code(), "keyword");
        let e = table.find("double", &args(&["string"]), false, &ts).unwrap_err();
        assert_eq!(e.code(), "sig");
        assert_eq!(table.find("double", &args(&["int"]), false, &ts).unwrap().entry, 10);
    }

    #[test]
    fn test_find_hides_private_from_repl() {
        let ts = TypeSystem::with_builtins();
        let mut table = FunctionTable::new();
        table.add(Function::new("secret", sig(&[("x", "int")]), 3).private());
        assert!(table.find("secret", &args(&["int"]), false, &ts).is_ok());
        assert_eq!(
            table.find("secret", &args(&["int"]), true, &ts),
            Err(ResolveError::Sig("secret".to_string()))
        );
    }
}
