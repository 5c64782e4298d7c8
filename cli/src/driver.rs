use anyhow::{Context, Result};
use frontend::surface::Module;
use frontend::{DeclStatus, ElabOptions, ElabOutput, Session};
use kernel::{GlobalDecl, GlobalName, Term};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Options of a `check` run.
#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    pub elab: ElabOptions,
    /// Definitions whose normal form is printed after elaboration.
    pub normalize: Vec<String>,
}

#[derive(Debug)]
pub struct Report {
    pub output: ElabOutput,
    /// `name : type` for every elaborated declaration, constructors indented.
    pub signatures: Vec<String>,
    pub normal_forms: Vec<(String, std::result::Result<String, String>)>,
}

impl Report {
    pub fn has_errors(&self) -> bool {
        self.output.has_errors() || self.normal_forms.iter().any(|(_, nf)| nf.is_err())
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.signatures {
            let _ = writeln!(out, "{}", line);
        }
        for diagnostic in &self.output.diagnostics {
            let _ = writeln!(out, "{}", diagnostic);
        }
        for (name, nf) in &self.normal_forms {
            match nf {
                Ok(term) => {
                    let _ = writeln!(out, "{} ~> {}", name, term);
                }
                Err(err) => {
                    let _ = writeln!(out, "cannot normalize `{}`: {}", name, err);
                }
            }
        }
        let failed = self
            .output
            .statuses
            .iter()
            .filter(|(_, status)| *status != DeclStatus::Elaborated)
            .count();
        let _ = writeln!(
            out,
            "{} declarations, {} failed",
            self.output.statuses.len(),
            failed
        );
        out
    }
}

/// Read a module serialized as JSON.
pub fn load_module(path: &Path) -> Result<Module> {
    let source = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let module: Module =
        serde_json::from_str(&source).with_context(|| format!("{} is not a valid module", path.display()))?;
    debug!(decls = module.decls.len(), "module loaded");
    Ok(module)
}

pub fn check_module(module: &Module, options: &CheckOptions) -> Report {
    let mut session = Session::new(options.elab);
    let output = session.elaborate_module(module);
    let signatures = signatures(&session, &output);
    let normal_forms = options
        .normalize
        .iter()
        .map(|name| (name.clone(), normal_form(&session, name)))
        .collect();
    Report {
        output,
        signatures,
        normal_forms,
    }
}

pub fn check_file(path: &Path, options: &CheckOptions) -> Result<Report> {
    let module = load_module(path)?;
    info!(file = %path.display(), "checking");
    Ok(check_module(&module, options))
}

fn signatures(session: &Session, output: &ElabOutput) -> Vec<String> {
    let env = session.env();
    let mut lines = Vec::new();
    for (name, status) in &output.statuses {
        if *status != DeclStatus::Elaborated {
            continue;
        }
        let def = match env.resolve(name) {
            Some(GlobalName::Fn(def)) | Some(GlobalName::Data(def)) => def,
            _ => continue,
        };
        let Some(decl) = env.get(def.id) else { continue };
        lines.push(format!("{} : {}", name, decl.ty()));
        if let GlobalDecl::Data(data) = decl {
            for ctor in &data.ctors {
                lines.push(format!("  {} : {}", ctor.name, ctor.ty));
            }
            for projection in &data.projections {
                if let Some(proj) = env.get(projection.id) {
                    lines.push(format!("  {} : {}", projection.name, proj.ty()));
                }
            }
        }
    }
    lines
}

fn normal_form(session: &Session, name: &str) -> std::result::Result<String, String> {
    let def = match session.env().resolve(name) {
        Some(GlobalName::Fn(def)) => def.clone(),
        Some(_) => return Err("not a function".to_string()),
        None => return Err("unknown definition".to_string()),
    };
    session
        .normalize(&Term::constant(def))
        .map(|term| term.to_string())
        .map_err(|diagnostic| diagnostic.message)
}
