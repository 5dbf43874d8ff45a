//! Rewriting of ES module syntax into CommonJS.
//!
//! Import and export statements are replaced in the source text, so the
//! result can go through the same script pipeline as a hand-written
//! CommonJS module. Imported bindings are copies taken when the import
//! statement runs, not live bindings.

use oxc_ast::ast::{
    Declaration, ExportDefaultDeclarationKind, ImportDeclarationSpecifier, Program, Statement,
};
use oxc_span::{GetSpan, Span};

const INTEROP_DEFAULT: &str =
    "function __plinthDefault(m) { return m && m.__esModule ? m : { default: m }; }";

/// Rewrite `program`'s module declarations as `require` calls and
/// `exports` assignments.
///
/// Returns `None` when the program has no import or export statement.
pub fn to_commonjs(program: &Program<'_>, source: &str) -> Option<String> {
    let mut rewriter = Rewriter::default();
    for statement in &program.body {
        rewriter.statement(statement);
    }

    if rewriter.edits.is_empty() {
        return None;
    }
    Some(rewriter.finish(source))
}

#[derive(Default)]
struct Rewriter {
    edits: Vec<(Span, String)>,
    trailing: Vec<String>,
    has_exports: bool,
    needs_interop: bool,
    temps: usize,
}

impl Rewriter {
    fn temp(&mut self) -> String {
        let name = format!("__plinth_module_{}", self.temps);
        self.temps += 1;
        name
    }

    fn statement(&mut self, statement: &Statement<'_>) {
        match statement {
            Statement::ImportDeclaration(decl) => {
                let from = quote(decl.source.value.as_str());
                let specifiers = decl.specifiers.as_ref().filter(|s| !s.is_empty());

                let text = match specifiers {
                    None => format!("require({});", from),
                    Some(specifiers) => {
                        let module = self.temp();
                        let mut out = format!("var {} = require({});", module, from);
                        for specifier in specifiers {
                            let binding = match specifier {
                                ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                                    self.needs_interop = true;
                                    format!(
                                        "var {} = __plinthDefault({}).default;",
                                        s.local.name, module
                                    )
                                }
                                ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                                    format!("var {} = {};", s.local.name, module)
                                }
                                ImportDeclarationSpecifier::ImportSpecifier(s) => format!(
                                    "var {} = {}[{}];",
                                    s.local.name,
                                    module,
                                    quote(s.imported.name().as_str())
                                ),
                            };
                            out.push(' ');
                            out.push_str(&binding);
                        }
                        out
                    }
                };
                self.edits.push((decl.span, text));
            }

            Statement::ExportNamedDeclaration(decl) => {
                self.has_exports = true;

                if let Some(declaration) = &decl.declaration {
                    for name in declared_names(declaration) {
                        self.trailing
                            .push(format!("exports[{}] = {};", quote(&name), name));
                    }
                    let prefix = Span::new(decl.span.start, declaration.span().start);
                    self.edits.push((prefix, String::new()));
                    return;
                }

                let text = if let Some(from) = &decl.source {
                    let module = self.temp();
                    let mut out = format!("var {} = require({});", module, quote(from.value.as_str()));
                    for specifier in &decl.specifiers {
                        out.push_str(&format!(
                            " exports[{}] = {}[{}];",
                            quote(specifier.exported.name().as_str()),
                            module,
                            quote(specifier.local.name().as_str())
                        ));
                    }
                    out
                } else {
                    for specifier in &decl.specifiers {
                        self.trailing.push(format!(
                            "exports[{}] = {};",
                            quote(specifier.exported.name().as_str()),
                            specifier.local.name()
                        ));
                    }
                    String::new()
                };
                self.edits.push((decl.span, text));
            }

            Statement::ExportDefaultDeclaration(decl) => {
                self.has_exports = true;

                let named = match &decl.declaration {
                    ExportDefaultDeclarationKind::FunctionDeclaration(func) => func.id.as_ref(),
                    ExportDefaultDeclarationKind::ClassDeclaration(class) => class.id.as_ref(),
                    _ => None,
                };

                let text = match named {
                    Some(id) => {
                        self.trailing.push(format!("exports.default = {};", id.name));
                        String::new()
                    }
                    None => "exports.default = ".to_string(),
                };
                let prefix = Span::new(decl.span.start, decl.declaration.span().start);
                self.edits.push((prefix, text));
            }

            Statement::ExportAllDeclaration(decl) => {
                self.has_exports = true;

                let from = quote(decl.source.value.as_str());
                let text = match &decl.exported {
                    Some(name) => format!("exports[{}] = require({});", quote(name.name().as_str()), from),
                    None => {
                        let module = self.temp();
                        format!(
                            "var {module} = require({from}); Object.keys({module}).forEach(function (key) {{ \
                             if (key !== \"default\" && !Object.prototype.hasOwnProperty.call(exports, key)) \
                             exports[key] = {module}[key]; }});"
                        )
                    }
                };
                self.edits.push((decl.span, text));
            }

            _ => {}
        }
    }

    fn finish(self, source: &str) -> String {
        let mut out = String::with_capacity(source.len() + 256);
        out.push_str("\"use strict\";\n");
        if self.has_exports {
            out.push_str("Object.defineProperty(exports, \"__esModule\", { value: true });\n");
        }
        if self.needs_interop {
            out.push_str(INTEROP_DEFAULT);
            out.push('\n');
        }

        let mut cursor = 0;
        for (span, text) in &self.edits {
            out.push_str(&source[cursor..span.start as usize]);
            out.push_str(text);
            cursor = span.end as usize;
        }
        out.push_str(&source[cursor..]);

        for line in &self.trailing {
            out.push('\n');
            out.push_str(line);
        }
        out.push('\n');
        out
    }
}

/// Names bound by an exported declaration.
fn declared_names(declaration: &Declaration<'_>) -> Vec<String> {
    match declaration {
        Declaration::VariableDeclaration(var) => var
            .declarations
            .iter()
            .flat_map(|d| d.id.get_binding_identifiers())
            .map(|id| id.name.to_string())
            .collect(),
        Declaration::FunctionDeclaration(func) => {
            func.id.iter().map(|id| id.name.to_string()).collect()
        }
        Declaration::ClassDeclaration(class) => {
            class.id.iter().map(|id| id.name.to_string()).collect()
        }
        _ => Vec::new(),
    }
}

fn quote(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}
