//! Plot source preparation and the Python runner that executes it.
//!
//! The runner is fed to `python3 -I -c`, reads the generated code from stdin
//! and writes PNG bytes to stdout. It arms an interval timer so a runaway
//! script is interrupted inside the interpreter with a dedicated exception,
//! and it closes every figure in a `finally` block whatever happened.

use crate::error::DiagramError;

/// Raster resolution used for plot output.
pub const PLOT_DPI: u32 = 150;

/// Exit status the runner uses for an interrupted script.
pub const EXIT_TIMEOUT: i32 = 3;
/// Exit status for an exception raised by the generated code.
pub const EXIT_ERROR: i32 = 2;
/// Exit status when matplotlib or numpy cannot be imported.
pub const EXIT_ENVIRONMENT: i32 = 5;

/// Top-level modules generated code may import.
pub const ALLOWED_IMPORTS: &[&str] = &["matplotlib", "mpl_toolkits", "numpy", "math"];

const RUNNER_TEMPLATE: &str = r#"import io
import math
import signal
import sys

try:
    import matplotlib
    matplotlib.use("Agg")
    import matplotlib.pyplot as plt
    import numpy as np
except ImportError as exc:
    sys.stderr.write("ENVIRONMENT: %s\n" % exc)
    sys.exit(__EXIT_ENVIRONMENT__)

import builtins

SAFE_NAMES = (
    "abs", "all", "any", "bool", "dict", "divmod", "enumerate", "filter",
    "float", "format", "frozenset", "int", "isinstance", "len", "list", "map",
    "max", "min", "pow", "range", "reversed", "round", "set", "slice",
    "sorted", "str", "sum", "tuple", "zip", "True", "False", "None",
    "ArithmeticError", "Exception", "IndexError", "KeyError",
    "ValueError", "ZeroDivisionError",
)
ALLOWED_IMPORTS = (__ALLOWED_IMPORTS__)


def _restricted_import(name, globals=None, locals=None, fromlist=(), level=0):
    if level != 0 or name.split(".")[0] not in ALLOWED_IMPORTS:
        raise ImportError("import of '%s' is not allowed" % name)
    return builtins.__import__(name, globals, locals, fromlist, level)


SAFE_BUILTINS = {name: getattr(builtins, name) for name in SAFE_NAMES if hasattr(builtins, name)}
SAFE_BUILTINS["print"] = lambda *args, **kwargs: None
SAFE_BUILTINS["__import__"] = _restricted_import


class PlotTimeout(BaseException):
    pass


def _interrupt(signum, frame):
    raise PlotTimeout()


def render():
    source = sys.stdin.read()
    namespace = {
        "__builtins__": SAFE_BUILTINS,
        "__name__": "__diagram__",
        "plt": plt,
        "np": np,
        "math": math,
        "matplotlib": matplotlib,
    }
    signal.signal(signal.SIGALRM, _interrupt)
    signal.setitimer(signal.ITIMER_REAL, __TIMEOUT__)
    try:
        exec(compile(source, "<diagram>", "exec"), namespace)
        if not plt.get_fignums():
            raise RuntimeError("the code did not create a figure")
        buffer = io.BytesIO()
        plt.gcf().savefig(buffer, format="png", dpi=__DPI__, bbox_inches="tight", facecolor="white")
    finally:
        signal.setitimer(signal.ITIMER_REAL, 0)
        plt.close("all")
    sys.stdout.buffer.write(buffer.getvalue())
    sys.stdout.buffer.flush()


try:
    render()
except PlotTimeout:
    sys.stderr.write("TIMEOUT: plot execution exceeded __TIMEOUT__s\n")
    sys.exit(__EXIT_TIMEOUT__)
except BaseException as exc:
    sys.stderr.write("ERROR: %s: %s\n" % (type(exc).__name__, exc))
    sys.exit(__EXIT_ERROR__)
"#;

/// Python runner with the timeout and DPI baked in.
pub fn runner_script(timeout_secs: f64, dpi: u32) -> String {
    RUNNER_TEMPLATE
        .replace("__TIMEOUT__", &format!("{timeout_secs:.1}"))
        .replace("__DPI__", &dpi.to_string())
        .replace("__EXIT_ENVIRONMENT__", &EXIT_ENVIRONMENT.to_string())
        .replace("__EXIT_TIMEOUT__", &EXIT_TIMEOUT.to_string())
        .replace("__EXIT_ERROR__", &EXIT_ERROR.to_string())
        .replace("__ALLOWED_IMPORTS__", &allowed_imports_tuple())
}

fn allowed_imports_tuple() -> String {
    ALLOWED_IMPORTS
        .iter()
        .map(|module| format!("\"{module}\", "))
        .collect::<String>()
}

/// Modules named by an import statement, or `None` when the line is not one.
fn imported_modules(line: &str) -> Option<Vec<&str>> {
    if let Some(rest) = line.strip_prefix("import ") {
        return Some(
            rest.split(',')
                .filter_map(|part| part.split_whitespace().next())
                .collect(),
        );
    }
    if let Some(rest) = line.strip_prefix("from ") {
        return Some(rest.split_whitespace().next().into_iter().collect());
    }
    None
}

fn root_module(module: &str) -> &str {
    module.split('.').next().unwrap_or(module)
}

fn is_output_call(line: &str) -> bool {
    ["plt.show(", "plt.savefig(", "fig.savefig(", "plt.close("]
        .iter()
        .any(|call| line.starts_with(call))
}

/// Reject imports outside [`ALLOWED_IMPORTS`] and strip calls that would show
/// or write the figure themselves.
pub fn sanitize_source(source: &str) -> Result<String, DiagramError> {
    let mut kept = Vec::new();

    for line in source.lines() {
        let trimmed = line.trim();

        if let Some(modules) = imported_modules(trimmed) {
            if let Some(module) = modules
                .iter()
                .find(|m| !ALLOWED_IMPORTS.contains(&root_module(m)))
            {
                return Err(DiagramError::SafetyRejection(format!(
                    "import of '{module}' is not allowed"
                )));
            }
        }

        if is_output_call(trimmed) {
            continue;
        }

        kept.push(line);
    }

    Ok(kept.join("\n"))
}

/// Classify a failed runner exit into the error taxonomy.
pub fn classify_exit(code: Option<i32>, stderr: &str, timeout_secs: u64) -> DiagramError {
    let detail = stderr
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("no diagnostic output")
        .trim()
        .to_string();

    match code {
        Some(EXIT_TIMEOUT) => DiagramError::timeout("plot execution", timeout_secs),
        Some(EXIT_ENVIRONMENT) => DiagramError::EnvironmentUnavailable(detail),
        Some(code) => DiagramError::ExecutionFailed(format!("exit status {code}: {detail}")),
        None => DiagramError::ExecutionFailed(format!("terminated by signal: {detail}")),
    }
}
