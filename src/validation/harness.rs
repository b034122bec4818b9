//! JavaScript harness scripts for the runtime and test stages
//!
//! Sources are embedded as JSON string literals and executed with
//! `node:vm` in fresh contexts that only expose inert stand-ins for
//! console, timers and `require`. Each script prints one JSON line.

use serde::{Deserialize, Serialize};

/// First line of the runtime check script
pub const RUNTIME_MARKER: &str = "// codemend:runtime";

/// First line of the differential test script
pub const TEST_MARKER: &str = "// codemend:test";

/// How before/after results are compared in the differential test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareMode {
    /// Wherever the original returns, the rewrite returns an equal value
    Equivalent,
    /// The rewrite may reject inputs, but must not raise a ReferenceError
    /// or TypeError the original did not
    Hardening,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatus {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Output of the runtime check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeReport {
    pub before: RunStatus,
    pub after: RunStatus,
}

/// Output of the differential test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TestReport {
    pub loaded: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub passed: u32,
    #[serde(default)]
    pub failed: u32,
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default)]
    pub failures: Vec<String>,
}

#[derive(Serialize)]
struct RuntimeInput<'a> {
    before: &'a str,
    after: &'a str,
    timeout: u64,
}

#[derive(Serialize)]
struct TestInput<'a> {
    before: &'a str,
    after: &'a str,
    name: &'a str,
    params: usize,
    mode: CompareMode,
    timeout: u64,
}

const SANDBOX_JS: &str = r#"
const vm = require("node:vm");
function sandbox() {
  const noop = () => undefined;
  const quiet = { log: noop, debug: noop, info: noop, warn: noop, error: noop, trace: noop };
  const module = { exports: {} };
  return vm.createContext({
    console: quiet,
    module,
    exports: module.exports,
    require: () => ({}),
    setTimeout: () => 0,
    setInterval: () => 0,
    clearTimeout: noop,
    clearInterval: noop,
    structuredClone: globalThis.structuredClone,
  });
}
function describe(v) {
  try {
    if (typeof v === "undefined") return "undefined";
    if (typeof v === "function") return "function";
    if (typeof v === "bigint") return v.toString() + "n";
    if (typeof v === "number" && Number.isNaN(v)) return "NaN";
    const s = JSON.stringify(v);
    return s === undefined ? String(v) : s;
  } catch (e) {
    return "unserializable";
  }
}
function errorName(e) {
  return e && typeof e === "object" && typeof e.name === "string" ? e.name : "Error";
}
function errorText(e) {
  return e && typeof e === "object" && "message" in e ? errorName(e) + ": " + e.message : String(e);
}
"#;

const RUNTIME_JS: &str = r#"
function execute(code) {
  try {
    vm.runInContext(code, sandbox(), { timeout: INPUT.timeout });
    return { ok: true };
  } catch (e) {
    return { ok: false, error: errorText(e) };
  }
}
process.stdout.write(JSON.stringify({ before: execute(INPUT.before), after: execute(INPUT.after) }) + "\n");
"#;

const TEST_JS: &str = r#"
const MAX_PAIRED = 3;
const samples = () => [
  0, 1, -1, 2.5, "", "a", "42", "[1,2]", "{\"a\":1}", true, false, null, undefined,
  [], [1, 2, 3], { a: 1 }, { a: { b: [1, 2] } },
];
function load(code) {
  const ctx = sandbox();
  vm.runInContext(code + "\n;globalThis.__codemend_target = " + INPUT.name + ";", ctx, { timeout: INPUT.timeout });
  if (typeof ctx.__codemend_target !== "function") throw new Error(INPUT.name + " is not a function");
  return ctx;
}
function call(ctx, args) {
  ctx.__codemend_args = args;
  try {
    const value = vm.runInContext("__codemend_target(...__codemend_args)", ctx, { timeout: INPUT.timeout });
    return { threw: false, value: describe(value) };
  } catch (e) {
    if (e && e.code === "ERR_SCRIPT_EXECUTION_TIMEOUT") return { timedOut: true };
    return { threw: true, name: errorName(e), value: errorText(e) };
  }
}
function rotation(i, n) {
  const out = [];
  for (let k = 0; k < INPUT.params; k++) out.push((i + k * 5) % n);
  return out;
}
function argSets() {
  const n = samples().length;
  const sets = [];
  for (let i = 0; i < n; i++) sets.push(rotation(i, n));
  // Every pair of pool values for each pair of leading parameters
  const wide = Math.min(INPUT.params, MAX_PAIRED);
  for (let j = 0; j < wide; j++) {
    for (let k = j + 1; k < wide; k++) {
      for (let x = 0; x < n; x++) {
        for (let y = 0; y < n; y++) {
          const set = rotation(x + y, n);
          set[j] = x;
          set[k] = y;
          sets.push(set);
        }
      }
    }
  }
  return sets;
}
function argsFor(set) {
  const pool = samples();
  return set.map((i) => pool[i]);
}
function main() {
  let before, after;
  try {
    before = load(INPUT.before);
  } catch (e) {
    return { loaded: false, error: "original: " + errorText(e) };
  }
  try {
    after = load(INPUT.after);
  } catch (e) {
    return { loaded: true, passed: 0, failed: 1, total: 1, failures: ["rewrite does not load: " + errorText(e)] };
  }
  const report = { loaded: true, passed: 0, failed: 0, total: 0, timed_out: false, failures: [] };
  const sets = argSets();
  for (let i = 0; i < sets.length; i++) {
    const b = call(before, argsFor(sets[i]));
    const a = call(after, argsFor(sets[i]));
    report.total++;
    if (b.timedOut || a.timedOut) {
      if (a.timedOut && !b.timedOut) {
        report.timed_out = true;
        report.failed++;
        report.failures.push("sample " + i + ": rewrite timed out");
      } else {
        report.passed++;
      }
      break;
    }
    let ok;
    if (INPUT.mode === "equivalent") {
      ok = b.threw || (!a.threw && a.value === b.value);
    } else {
      ok = b.threw || !a.threw || (a.name !== "ReferenceError" && a.name !== "TypeError");
    }
    if (ok) {
      report.passed++;
    } else {
      report.failed++;
      report.failures.push("sample " + i + ": expected " + b.value + ", got " + a.value);
    }
  }
  return report;
}
process.stdout.write(JSON.stringify(main()) + "\n");
"#;

fn input_line<T: Serialize>(input: &T) -> String {
    // serde_json output is a valid JavaScript expression
    let json = serde_json::to_string(input).unwrap_or_else(|_| "{}".to_string());
    format!("const INPUT = {};\n", json)
}

/// Script executing the `before` and `after` programs in separate fresh contexts
pub fn runtime_script(before: &str, after: &str, timeout_ms: u64) -> String {
    let input = RuntimeInput {
        before,
        after,
        timeout: timeout_ms.max(1),
    };
    format!("{RUNTIME_MARKER}\n{}{SANDBOX_JS}{RUNTIME_JS}", input_line(&input))
}

/// Script loading both versions of a function and comparing them on fixed
/// samples. Functions with two or more parameters are also called with every
/// pair of sample values in their leading parameters, so coercing pairs such
/// as `0` and `""` are always exercised.
pub fn test_script(
    before: &str,
    after: &str,
    name: &str,
    params: usize,
    mode: CompareMode,
    timeout_ms: u64,
) -> String {
    let input = TestInput {
        before,
        after,
        name,
        params,
        mode,
        timeout: call_timeout(timeout_ms),
    };
    format!("{TEST_MARKER}\n{}{SANDBOX_JS}{TEST_JS}", input_line(&input))
}

/// Per-call limit inside the test script, leaving room to report a hung
/// rewrite before the runner's own timeout fires
fn call_timeout(timeout_ms: u64) -> u64 {
    (timeout_ms / 4).max(1)
}

/// Parse the last non-empty stdout line as `T`
pub fn parse_report<T: for<'de> Deserialize<'de>>(stdout: &str) -> Option<T> {
    let line = stdout.lines().rev().find(|l| !l.trim().is_empty())?;
    serde_json::from_str(line.trim()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripts_start_with_marker_and_embed_sources() {
        let script = runtime_script("eval(x)", "JSON.parse(x)", 100);
        assert!(script.starts_with(RUNTIME_MARKER));
        assert!(script.contains(r#""before":"eval(x)""#));

        let script = test_script("function f(a){}", "function f(a){}", "f", 1, CompareMode::Equivalent, 50);
        assert!(script.starts_with(TEST_MARKER));
        assert!(script.contains(r#""mode":"equivalent""#));
        assert!(script.contains(r#""params":1"#));
    }

    #[test]
    fn test_calls_get_a_share_of_the_timeout() {
        let script = test_script("function f(a, b){}", "function f(a, b){}", "f", 2, CompareMode::Equivalent, 2000);
        assert!(script.contains(r#""timeout":500"#));
        assert!(script.contains("const MAX_PAIRED = 3;"));
        assert_eq!(call_timeout(2), 1);
    }

    #[test]
    fn test_sources_with_quotes_are_escaped() {
        let script = runtime_script("a(\"</script>\\n\")", "b('x')", 100);
        let line = script.lines().nth(1).expect("input line");
        let json = line
            .strip_prefix("const INPUT = ")
            .and_then(|l| l.strip_suffix(';'))
            .expect("input literal");
        let value: serde_json::Value = serde_json::from_str(json).expect("valid json");
        assert_eq!(value["before"], "a(\"</script>\\n\")");
    }

    #[test]
    fn test_parse_report_uses_last_line() {
        let stdout = "noise\n{\"before\":{\"ok\":true},\"after\":{\"ok\":false,\"error\":\"ReferenceError: x\"}}\n\n";
        let report: RuntimeReport = parse_report(stdout).expect("report");
        assert!(report.before.ok);
        assert!(!report.after.ok);

        let test: TestReport = parse_report("{\"loaded\":false,\"error\":\"boom\"}").expect("report");
        assert!(!test.loaded);
        assert_eq!(test.total, 0);
        assert!(parse_report::<TestReport>("not json").is_none());
    }
}
