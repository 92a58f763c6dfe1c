//! Baseline skeleton for the generated application.
//!
//! Every run starts from a minimal runnable Python project so that even a
//! fully failed fan-out leaves something executable behind. Provisioning is
//! idempotent: existing files are never touched, only missing ones are
//! created.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

/// Relative paths of every baseline file. The applier treats these as
/// protected: task manifests may not overwrite them once they exist.
pub const BASELINE_FILES: &[&str] = &[
    "pyproject.toml",
    "src/app/__init__.py",
    "src/app/domain.py",
    "src/app/services.py",
    "src/app/ui.py",
    "src/app/__main__.py",
    "tests/test_smoke.py",
];

const PYPROJECT: &str = r#"[project]
name = "generated_app"
version = "0.1.0"
requires-python = ">=3.10,<3.14"

[tool.pytest.ini_options]
pythonpath = ["src"]
"#;

const APP_INIT: &str = "__all__ = []\n";

const APP_DOMAIN: &str = r#"from __future__ import annotations

from dataclasses import dataclass


@dataclass
class Task:
    id: int
    text: str
    done: bool = False


class TaskManager:
    def __init__(self) -> None:
        self._tasks: dict[int, Task] = {}
        self._next_id = 1

    def add(self, text: str) -> Task:
        t = Task(id=self._next_id, text=text, done=False)
        self._tasks[t.id] = t
        self._next_id += 1
        return t

    def list(self) -> list[Task]:
        return [self._tasks[k] for k in sorted(self._tasks.keys())]

    def done(self, task_id: int) -> None:
        if task_id not in self._tasks:
            raise KeyError(task_id)
        self._tasks[task_id].done = True

    def remove(self, task_id: int) -> None:
        if task_id not in self._tasks:
            raise KeyError(task_id)
        del self._tasks[task_id]
"#;

const APP_SERVICES: &str = r#"from __future__ import annotations

import json
from pathlib import Path

from app.domain import Task, TaskManager


def load(manager: TaskManager, storage_path: Path) -> None:
    if not storage_path.exists():
        return
    data = json.loads(storage_path.read_text(encoding='utf-8'))
    tasks = data.get('tasks', []) if isinstance(data, dict) else []
    # Rebuild manager deterministically.
    for t in tasks:
        task = Task(id=int(t['id']), text=str(t['text']), done=bool(t.get('done', False)))
        manager._tasks[task.id] = task  # noqa: SLF001 (intentionally minimal)
        manager._next_id = max(manager._next_id, task.id + 1)  # noqa: SLF001


def save(manager: TaskManager, storage_path: Path) -> None:
    tasks = [{'id': t.id, 'text': t.text, 'done': t.done} for t in manager.list()]
    storage_path.parent.mkdir(parents=True, exist_ok=True)
    storage_path.write_text(json.dumps({'tasks': tasks}, indent=2), encoding='utf-8')
"#;

const APP_UI: &str = r#"from __future__ import annotations

from pathlib import Path

from app.domain import TaskManager
from app.services import load, save


def run_demo(storage_path: Path) -> str:
    mgr = TaskManager()
    load(mgr, storage_path)
    t = mgr.add('demo task')
    mgr.done(t.id)
    save(mgr, storage_path)
    return f'Demo OK: added+completed task {t.id}'
"#;

const APP_MAIN: &str = r#"from __future__ import annotations

import argparse
from pathlib import Path

from app.ui import run_demo


def main(argv: list[str] | None = None) -> int:
    parser = argparse.ArgumentParser(prog='app', description='Generated app skeleton')
    parser.add_argument('--demo', action='store_true', help='Run a small end-to-end demo')
    parser.add_argument('--storage', default='data/tasks.json', help='Path to JSON task storage')
    args = parser.parse_args(argv)

    if args.demo:
        msg = run_demo(Path(args.storage))
        print(msg)
        return 0

    parser.print_help()
    return 0


if __name__ == '__main__':
    raise SystemExit(main())
"#;

const TEST_SMOKE: &str = r#"import subprocess
import sys
import unittest
from pathlib import Path


class TestSmoke(unittest.TestCase):
    def test_help(self):
        root = Path(__file__).resolve().parents[1]
        r = subprocess.run([sys.executable, '-m', 'app', '--help'], cwd=root, capture_output=True, text=True)
        self.assertEqual(r.returncode, 0)
        self.assertIn('usage:', r.stdout.lower())

    def test_demo(self):
        root = Path(__file__).resolve().parents[1]
        r = subprocess.run([sys.executable, '-m', 'app', '--demo'], cwd=root, capture_output=True, text=True)
        self.assertEqual(r.returncode, 0)
        self.assertIn('demo ok', r.stdout.lower())


if __name__ == '__main__':
    unittest.main()
"#;

fn baseline_contents() -> [(&'static str, &'static str); 7] {
    [
        ("pyproject.toml", PYPROJECT),
        ("src/app/__init__.py", APP_INIT),
        ("src/app/domain.py", APP_DOMAIN),
        ("src/app/services.py", APP_SERVICES),
        ("src/app/ui.py", APP_UI),
        ("src/app/__main__.py", APP_MAIN),
        ("tests/test_smoke.py", TEST_SMOKE),
    ]
}

/// Create any missing baseline files under `generated_app_dir`.
///
/// Returns the absolute paths actually written this call. Existing files,
/// whatever their content, are left alone.
pub fn ensure_skeleton(generated_app_dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(generated_app_dir)
        .with_context(|| format!("create directory {}", generated_app_dir.display()))?;

    let mut written = Vec::new();
    for (rel, content) in baseline_contents() {
        let target = generated_app_dir.join(rel);
        if target.exists() {
            debug!(path = rel, "baseline file already present");
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        fs::write(&target, content).with_context(|| format!("write {}", target.display()))?;
        written.push(
            fs::canonicalize(&target)
                .with_context(|| format!("resolve {}", target.display()))?,
        );
    }

    info!(
        dir = %generated_app_dir.display(),
        created = written.len(),
        "baseline skeleton ensured"
    );
    Ok(written)
}
