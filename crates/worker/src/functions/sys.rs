//! The `sys` module: introspection of the loaded functions.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use caller_core::{BoundArgs, FunctionError, FunctionSignature, Invocable, InvocationOutcome};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SysFn {
    Doc,
    ListFunctions,
}

pub struct SysFunction {
    name: &'static str,
    kind: SysFn,
    doc: &'static str,
    signature: FunctionSignature,
    docs: Arc<BTreeMap<String, String>>,
}

/// `docs` is the name to docstring table the functions report on.
pub fn functions(docs: Arc<BTreeMap<String, String>>) -> Vec<Arc<dyn Invocable>> {
    vec![
        Arc::new(SysFunction {
            name: "sys.doc",
            kind: SysFn::Doc,
            doc: "Return the docstrings for all functions, or for functions starting with \
                  any of the given prefixes.\n\n    caller call sys.doc test",
            signature: FunctionSignature::new().with_varargs(),
            docs: Arc::clone(&docs),
        }),
        Arc::new(SysFunction {
            name: "sys.list_functions",
            kind: SysFn::ListFunctions,
            doc: "List the functions available, optionally only those starting with \
                  the given prefixes.\n\n    caller call sys.list_functions cmd",
            signature: FunctionSignature::new().with_varargs(),
            docs,
        }),
    ]
}

impl SysFunction {
    fn matching(&self, prefixes: &[Value]) -> impl Iterator<Item = (&String, &String)> {
        let prefixes: Vec<String> = prefixes
            .iter()
            .map(|p| match p {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        self.docs.iter().filter(move |(name, _)| {
            prefixes.is_empty() || prefixes.iter().any(|p| name.starts_with(p.as_str()))
        })
    }
}

#[async_trait]
impl Invocable for SysFunction {
    fn name(&self) -> &str {
        self.name
    }

    fn doc(&self) -> Option<&str> {
        Some(self.doc)
    }

    fn signature(&self) -> &FunctionSignature {
        &self.signature
    }

    async fn invoke(&self, args: &BoundArgs) -> Result<InvocationOutcome, FunctionError> {
        let value = match self.kind {
            SysFn::Doc => Value::Object(
                self.matching(args.extra_args())
                    .map(|(name, doc)| (name.clone(), Value::String(doc.clone())))
                    .collect::<Map<String, Value>>(),
            ),
            SysFn::ListFunctions => Value::Array(
                self.matching(args.extra_args())
                    .map(|(name, _)| Value::String(name.clone()))
                    .collect(),
            ),
        };
        Ok(InvocationOutcome::new(value))
    }
}
