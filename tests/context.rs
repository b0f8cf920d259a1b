use code_graph::config::ProjectConfig;
use code_graph::context::{self, ContextRequest};
use code_graph::reconciler::Reconciler;
use code_graph::resolver;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

static TEMP_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn temp_project(label: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let counter = TEMP_COUNTER.fetch_add(1, Ordering::SeqCst);
    dir.push(format!("code-graph-ctx-{label}-{nanos}-{counter}"));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn indexed_project(label: &str) -> (Reconciler, PathBuf) {
    let root = temp_project(label);
    ProjectConfig::init(&root, false).unwrap();
    write(
        &root,
        "src/util.ts",
        "export function formatName(name: string){ return name.trim(); }\n",
    );
    write(
        &root,
        "src/target.ts",
        "import { formatName } from \"./util\";\nexport function renderUser(name: string){ return formatName(name); }\n",
    );
    write(
        &root,
        "src/consumer.ts",
        "import { renderUser } from \"./target\";\nexport function page(){ return renderUser(\"x\"); }\n",
    );
    write(
        &root,
        "src/consumer.test.ts",
        "import { renderUser } from \"./target\";\nexport function checkRender(){ return renderUser(\"t\"); }\n",
    );
    let mut reconciler = Reconciler::open(&root).unwrap();
    reconciler.full_sync(true).unwrap();
    resolver::resolve(reconciler.store()).unwrap();
    (reconciler, root)
}

#[test]
fn budget_is_respected() {
    let (reconciler, root) = indexed_project("budget");
    let request = ContextRequest {
        file_path: "src/target.ts",
        task: None,
        max_tokens: 1000,
        include_tests: false,
    };
    let assembled = context::assemble(reconciler.store(), &root, &request).unwrap();
    assert!(assembled.token_estimate <= 1000);
    assert_eq!(assembled.max_tokens, 1000);
    assert!(!assembled.target_file.truncated);
    std::fs::remove_dir_all(root).ok();
}

#[test]
fn oversized_target_is_truncated_with_indicator() {
    let root = temp_project("truncate");
    ProjectConfig::init(&root, false).unwrap();
    let mut big = String::new();
    for i in 0..200 {
        big.push_str(&format!("export function f{i}(){{ return {i}; }}\n"));
    }
    write(&root, "src/big.ts", &big);
    let mut reconciler = Reconciler::open(&root).unwrap();
    reconciler.full_sync(true).unwrap();

    let request = ContextRequest {
        file_path: "src/big.ts",
        task: None,
        max_tokens: 1000,
        include_tests: false,
    };
    let assembled = context::assemble(reconciler.store(), &root, &request).unwrap();
    // Chars exceed 1000 * 0.6 * 4, so the target is cut at a newline.
    assert!(big.len() > 2400);
    assert!(assembled.target_file.truncated);
    assert!(assembled.target_file.content.contains("truncated"));
    assert!(assembled.target_file.token_estimate <= 600);
    assert!(assembled.token_estimate <= 1000);
    std::fs::remove_dir_all(root).ok();
}

#[test]
fn imports_are_inlined_and_dependents_collected() {
    let (reconciler, root) = indexed_project("slots");
    let request = ContextRequest {
        file_path: "src/target.ts",
        task: None,
        max_tokens: 8000,
        include_tests: false,
    };
    let assembled = context::assemble(reconciler.store(), &root, &request).unwrap();

    assert!(assembled
        .imports
        .iter()
        .any(|snippet| snippet.name == "formatName" && snippet.path == "src/util.ts"));
    assert!(assembled
        .dependents
        .iter()
        .any(|snippet| snippet.path == "src/consumer.ts"));
    // Test files stay out unless asked for.
    assert!(!assembled
        .dependents
        .iter()
        .any(|snippet| snippet.path.contains(".test.")));
    std::fs::remove_dir_all(root).ok();
}

#[test]
fn include_tests_admits_test_dependents() {
    let (reconciler, root) = indexed_project("tests-in");
    let request = ContextRequest {
        file_path: "src/target.ts",
        task: None,
        max_tokens: 8000,
        include_tests: true,
    };
    let assembled = context::assemble(reconciler.store(), &root, &request).unwrap();
    assert!(assembled
        .dependents
        .iter()
        .any(|snippet| snippet.path == "src/consumer.test.ts"));
    std::fs::remove_dir_all(root).ok();
}

#[test]
fn task_keywords_surface_similar_functions() {
    let (reconciler, root) = indexed_project("similar");
    write(
        &root,
        "src/render.ts",
        "export function renderHeader(){ return \"h\"; }\n",
    );
    // Index the extra file too.
    let mut reconciler = reconciler;
    reconciler.full_sync(true).unwrap();
    resolver::resolve(reconciler.store()).unwrap();

    let request = ContextRequest {
        file_path: "src/target.ts",
        task: Some("improve renderHeader output"),
        max_tokens: 8000,
        include_tests: false,
    };
    let assembled = context::assemble(reconciler.store(), &root, &request).unwrap();
    assert!(assembled
        .similar_functions
        .iter()
        .any(|snippet| snippet.name == "renderHeader" && snippet.path == "src/render.ts"));
    std::fs::remove_dir_all(root).ok();
}
