use cli::{check_file, load_module, CheckOptions};
use frontend::surface::{Clause, CtorDecl, Decl, Module, Param, Pattern, SurfaceTerm};
use frontend::ElabOptions;
use insta::assert_snapshot;
use std::fs;
use tempfile::TempDir;

const NAT_JSON: &str = r#"{
  "decls": [
    {
      "name": "Nat",
      "kind": { "Data": {
        "params": [],
        "sort": { "kind": { "Sort": 0 } },
        "ctors": [
          { "name": "zero", "fields": [] },
          { "name": "succ", "fields": [ { "name": "n", "ty": { "kind": { "Var": "Nat" } } } ] }
        ]
      } }
    },
    {
      "name": "two",
      "kind": { "Fn": {
        "params": [],
        "result": { "kind": { "Var": "Nat" } },
        "body": { "Expr": { "kind": { "NatLit": 2 } } }
      } }
    }
  ]
}"#;

fn options(normalize: &[&str]) -> CheckOptions {
    CheckOptions {
        elab: ElabOptions {
            fuel: Some(100_000),
            jobs: 1,
        },
        normalize: normalize.iter().map(|n| n.to_string()).collect(),
    }
}

fn write_module(dir: &TempDir, module: &Module) -> std::path::PathBuf {
    let path = dir.path().join("module.json");
    fs::write(&path, serde_json::to_string_pretty(module).unwrap()).unwrap();
    path
}

#[test]
fn hand_written_module_is_loaded_and_checked() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nat.json");
    fs::write(&path, NAT_JSON).unwrap();

    let report = check_file(&path, &options(&["two"])).unwrap();
    assert!(!report.has_errors());
    assert_snapshot!(report.render(), @r###"
    Nat : Type
      zero : Nat
      succ : Nat -> Nat
    two : Nat
    two ~> 2
    2 declarations, 0 failed
    "###);
}

#[test]
fn failures_are_rendered_with_their_declaration() {
    let dir = TempDir::new().unwrap();
    let nat = load_module_from(NAT_JSON);
    let mut decls = nat.decls;
    decls.push(Decl::clauses(
        "pred",
        vec![Param::explicit("m", SurfaceTerm::var("Nat"))],
        SurfaceTerm::var("Nat"),
        vec![Clause::new(
            vec![Pattern::ctor("succ", vec![Pattern::bind("k")])],
            SurfaceTerm::var("k"),
        )],
    ));
    let path = write_module(&dir, &Module::new(decls));

    let report = check_file(&path, &options(&["pred"])).unwrap();
    assert!(report.has_errors());
    assert_snapshot!(report.render(), @r###"
    Nat : Type
      zero : Nat
      succ : Nat -> Nat
    two : Nat
    error[CoverageGap] in `pred`: patterns do not cover: zero
      missing: zero
    cannot normalize `pred`: unknown definition
    3 declarations, 1 failed
    "###);
}

#[test]
fn serialized_modules_round_trip_through_the_loader() {
    let dir = TempDir::new().unwrap();
    let module = Module::new(vec![Decl::data(
        "Unit",
        vec![],
        SurfaceTerm::sort(0),
        vec![CtorDecl::new("unit", vec![])],
    )]);
    let path = write_module(&dir, &module);
    assert_eq!(load_module(&path).unwrap(), module);
}

#[test]
fn missing_and_malformed_files_are_errors() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("absent.json");
    let err = check_file(&missing, &options(&[])).unwrap_err();
    assert!(err.to_string().starts_with("failed to read"));

    let malformed = dir.path().join("bad.json");
    fs::write(&malformed, "{ \"decls\": 3 }").unwrap();
    let err = load_module(&malformed).unwrap_err();
    assert!(err.to_string().ends_with("is not a valid module"));
}

fn load_module_from(json: &str) -> Module {
    serde_json::from_str(json).unwrap()
}
