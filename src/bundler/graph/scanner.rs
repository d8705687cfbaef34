//! Static extraction of module references from script source.
//!
//! Sources are parsed with swc, and references are read off the syntax tree.
//! Only string-literal arguments of `require(...)`, `require.resolve(...)` and
//! `import(...)` count as static references. Anything computed is reported as
//! [`Reference::Dynamic`] and never followed. Comments, string contents and
//! regular expression literals never produce references.

use crate::bundler::error::{Error, Result};
use std::path::Path;
use swc_core::{
    common::{FileName, SourceMap, SourceMapper, Spanned, input::StringInput, sync::Lrc},
    ecma::{
        ast::{
            CallExpr, Callee, EsVersion, Expr, Lit, MemberProp, MetaPropExpr, MetaPropKind,
            ModuleItem, Program, Tpl,
        },
        visit::{Visit, VisitWith},
    },
};
use swc_ecma_parser::{EsSyntax, Parser, Syntax, TsSyntax, lexer::Lexer};

/// Longest expression snippet kept for a dynamic reference.
const SNIPPET_LEN: usize = 60;

/// One reference found in a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// A string literal reference.
    Static(String),
    /// A computed reference, with a snippet of the expression.
    Dynamic(String),
}

/// References and syntax markers of one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    pub references: Vec<Reference>,
    /// Static `import`/`export` declarations or `import.meta` are present.
    pub has_module_syntax: bool,
}

/// Parser dialect for a file, picked from its extension.
fn syntax_for(path: &Path) -> Syntax {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("ts" | "cts" | "mts") => Syntax::Typescript(TsSyntax::default()),
        Some("tsx") => Syntax::Typescript(TsSyntax {
            tsx: true,
            ..Default::default()
        }),
        other => Syntax::Es(EsSyntax {
            jsx: other == Some("jsx"),
            allow_return_outside_function: true,
            ..Default::default()
        }),
    }
}

/// Scans `source`, read from `path`, for module references.
///
/// # Errors
///
/// Returns [`Error::SourceParse`] when the source is not valid for its
/// extension's dialect.
pub fn scan(source: &str, path: &Path) -> Result<ScanResult> {
    let source_map: Lrc<SourceMap> = Default::default();
    let source_file =
        source_map.new_source_file(Lrc::new(FileName::Real(path.to_path_buf())), source.into());

    let lexer = Lexer::new(
        syntax_for(path),
        EsVersion::latest(),
        StringInput::from(&*source_file),
        None,
    );
    let mut parser = Parser::new_from(lexer);
    let program = parser.parse_program().map_err(|err| Error::SourceParse {
        path: path.to_path_buf(),
        line: source_map.lookup_char_pos(err.span().lo).line,
        message: err.kind().msg().to_string(),
    })?;

    let mut collector = ReferenceCollector {
        source_map: &source_map,
        references: Vec::new(),
        has_module_syntax: matches!(
            &program,
            Program::Module(module)
                if module.body.iter().any(|item| matches!(item, ModuleItem::ModuleDecl(_)))
        ),
    };
    program.visit_with(&mut collector);

    Ok(ScanResult {
        references: collector.references,
        has_module_syntax: collector.has_module_syntax,
    })
}

/// Whether `source` uses static module syntax. Unparseable sources count as
/// plain scripts.
pub fn has_module_syntax(source: &str, path: &Path) -> bool {
    scan(source, path).is_ok_and(|result| result.has_module_syntax)
}

struct ReferenceCollector<'a> {
    source_map: &'a SourceMap,
    references: Vec<Reference>,
    has_module_syntax: bool,
}

impl ReferenceCollector<'_> {
    fn snippet(&self, expr: &Expr) -> String {
        self.source_map
            .span_to_snippet(expr.span())
            .unwrap_or_default()
            .trim()
            .chars()
            .take(SNIPPET_LEN)
            .collect()
    }

    /// Classifies the first argument of a reference call.
    fn classify(&self, call: &CallExpr) -> Reference {
        let Some(argument) = call.args.first() else {
            return Reference::Dynamic(String::new());
        };
        if argument.spread.is_some() {
            return Reference::Dynamic(self.snippet(&argument.expr));
        }
        match &*argument.expr {
            Expr::Lit(Lit::Str(literal)) => Reference::Static(literal.value.to_string()),
            Expr::Tpl(template) => match plain_template(template) {
                Some(text) => Reference::Static(text),
                None => Reference::Dynamic(self.snippet(&argument.expr)),
            },
            other => Reference::Dynamic(self.snippet(other)),
        }
    }
}

/// The text of a template literal without substitutions.
fn plain_template(template: &Tpl) -> Option<String> {
    match (template.exprs.as_slice(), template.quasis.as_slice()) {
        ([], [quasi]) => quasi.cooked.as_ref().map(|cooked| cooked.to_string()),
        _ => None,
    }
}

/// Whether `callee` is `require` or `require.resolve`.
fn is_require_callee(callee: &Expr) -> bool {
    match callee {
        Expr::Ident(ident) => &*ident.sym == "require",
        Expr::Member(member) => {
            matches!(&*member.obj, Expr::Ident(obj) if &*obj.sym == "require")
                && matches!(&member.prop, MemberProp::Ident(prop) if &*prop.sym == "resolve")
        }
        _ => false,
    }
}

impl Visit for ReferenceCollector<'_> {
    fn visit_call_expr(&mut self, call: &CallExpr) {
        let is_reference = match &call.callee {
            Callee::Import(_) => true,
            Callee::Expr(callee) => is_require_callee(callee),
            Callee::Super(_) => false,
        };
        if is_reference {
            let reference = self.classify(call);
            self.references.push(reference);
        }
        call.visit_children_with(self);
    }

    fn visit_meta_prop_expr(&mut self, meta: &MetaPropExpr) {
        if meta.kind == MetaPropKind::ImportMeta {
            self.has_module_syntax = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statics(source: &str) -> Vec<String> {
        scan(source, Path::new("fn.js"))
            .unwrap()
            .references
            .into_iter()
            .filter_map(|r| match r {
                Reference::Static(s) => Some(s),
                Reference::Dynamic(_) => None,
            })
            .collect()
    }

    fn module_syntax(source: &str) -> bool {
        has_module_syntax(source, Path::new("fn.js"))
    }

    #[test]
    fn literal_requires_and_imports() {
        let source = r#"
            const b = require('./b');
            const pad = require("left-pad");
            const p = require.resolve('./data.json', { paths: [__dirname] });
            async function load() { return import(`./lazy`); }
        "#;
        assert_eq!(statics(source), vec!["./b", "left-pad", "./data.json", "./lazy"]);
    }

    #[test]
    fn computed_arguments_are_dynamic() {
        let result = scan(
            "const m = require(name); const n = require(`./x/${id}`); require('./a' + b)",
            Path::new("fn.js"),
        )
        .unwrap();
        assert_eq!(
            result.references,
            vec![
                Reference::Dynamic("name".into()),
                Reference::Dynamic("`./x/${id}`".into()),
                Reference::Dynamic("'./a' + b".into()),
            ]
        );
    }

    #[test]
    fn comments_and_member_calls_are_ignored() {
        let source = r#"
            // require('commented-out')
            /* require("also-commented") */
            const url = "http://example.com"; // trailing
            loader.require('not-a-module');
            myrequire('nope');
            require('kept');
        "#;
        assert_eq!(statics(source), vec!["kept"]);
    }

    #[test]
    fn strings_containing_comment_markers_survive() {
        let source = "const s = '// not a comment'; require('./real')";
        assert_eq!(statics(source), vec!["./real"]);
    }

    #[test]
    fn regex_literals_do_not_hide_later_requires() {
        let source = "const re = /[/*]/;\nconst slash = /\\/\\//g;\nconst b = require('./b');\n";
        assert_eq!(statics(source), vec!["./b"]);
    }

    #[test]
    fn require_text_inside_strings_is_not_a_reference() {
        let source = r#"
            const hint = "install it and call require('pg') yourself";
            const doc = `use import('x') at runtime`;
            module.exports = hint + doc;
        "#;
        assert!(scan(source, Path::new("fn.js")).unwrap().references.is_empty());
    }

    #[test]
    fn nested_requires_are_found() {
        let source = "module.exports = wrap(require('./inner'), () => require('./lazy'));";
        assert_eq!(statics(source), vec!["./inner", "./lazy"]);
    }

    #[test]
    fn top_level_return_and_typescript_parse() {
        assert_eq!(
            statics("if (process.env.SKIP) return;\nrequire('./x');"),
            vec!["./x"]
        );
        let ts = scan(
            "const n: number = 1;\nconst m = require('./m') as Mod;",
            Path::new("fn.ts"),
        )
        .unwrap();
        assert_eq!(ts.references, vec![Reference::Static("./m".into())]);
    }

    #[test]
    fn syntax_errors_name_the_file_and_line() {
        let err = scan("const ok = 1;\nconst = ;\n", Path::new("/fns/broken.js")).unwrap_err();
        assert!(matches!(
            err,
            Error::SourceParse { ref path, line: 2, .. } if path == Path::new("/fns/broken.js")
        ));
    }

    #[test]
    fn module_syntax_detection() {
        assert!(module_syntax("import pad from 'left-pad'\n"));
        assert!(module_syntax("import { a } from './a.js'"));
        assert!(module_syntax("export default function handler() {}"));
        assert!(module_syntax("export const handler = async () => {}"));
        assert!(module_syntax("const here = import.meta.url"));
        assert!(!module_syntax("const m = import('./dyn')"));
        assert!(!module_syntax("module.exports.handler = () => {}"));
        assert!(!module_syntax("// import x from 'y'\nrequire('z')"));
        assert!(!module_syntax("importScripts('x')"));
    }
}
