/// Python scripts executed inside sandbox children
///
/// Both scripts receive everything they need as data: the candidate path, the
/// resolved entry class name and the mock context arrive on argv or stdin,
/// never interpolated into source. Candidate `print` output is routed to
/// stderr so only the harness can write the sentinel or score line to stdout.

/// Sentinel the loader child prints after a successful instantiation
pub const LOAD_SENTINEL: &str = "SUCCESS";

/// Prefix of the one line the functional driver prints
pub const SCORE_PREFIX: &str = "SCORE:";

const PRELUDE: &str = r#"import asyncio
import contextlib
import inspect
import json
import sys


class MockNode:
    def __init__(self, attrs):
        for key, value in attrs.items():
            setattr(self, key, value)

    async def broadcast(self, message):
        return None


def load_entry(path, entry):
    with open(path, encoding="utf-8") as handle:
        source = handle.read()
    namespace = {"__name__": "__candidate__", "__file__": path}
    exec(compile(source, path, "exec"), namespace)
    handler_type = namespace.get(entry)
    if not isinstance(handler_type, type):
        raise LookupError("entry point %r is not a class in the candidate" % entry)
    return handler_type

"#;

/// argv: candidate path, entry class, mock context JSON
const LOADER_BODY: &str = r#"
def main():
    path, entry, context = sys.argv[1], sys.argv[2], json.loads(sys.argv[3])
    try:
        with contextlib.redirect_stdout(sys.stderr):
            handler_type = load_entry(path, entry)
            handler_type(MockNode(context))
    except BaseException as exc:
        print("FAILED: %s: %s" % (type(exc).__name__, exc))
        sys.stdout.flush()
        return
    print("SUCCESS")
    sys.stdout.flush()


main()
"#;

/// stdin: JSON plan (candidate, entry, context, hooks, cases, points)
const FUNCTIONAL_BODY: &str = r#"
async def settle(value):
    if inspect.isawaitable(value):
        return await value
    return value


def payload_matches(payload, check):
    kind = check.get("kind")
    if kind == "contains":
        text = str(payload)
        return all(needle in text for needle in check["needles"])
    if kind == "field_at_least":
        if not isinstance(payload, dict):
            return False
        value = payload.get(check["field"], 0)
        if isinstance(value, bool) or not isinstance(value, (int, float)):
            return False
        return value >= check["minimum"]
    return False


async def run_case(handler, method, case):
    entry = getattr(handler, method)
    result = None
    for message in case["messages"]:
        result = await settle(entry(dict(message)))
    if not isinstance(result, dict):
        return 0
    points = 0
    if result.get("type") == case["expected_type"]:
        points += case["type_points"]
    if payload_matches(result.get("payload"), case["check"]):
        points += case["payload_points"]
    return points


async def drive(plan):
    score = 0
    try:
        handler_type = load_entry(plan["candidate"], plan["entry"])
        handler = handler_type(MockNode(plan["context"]))
    except BaseException as exc:
        print("load failed: %s" % exc, file=sys.stderr)
        return 0

    hook = getattr(handler, plan["activate_hook"], None)
    if callable(hook):
        try:
            await settle(hook())
            score += plan["activate_points"]
        except Exception as exc:
            print("activate failed: %s" % exc, file=sys.stderr)

    for case in plan["cases"]:
        try:
            score += await run_case(handler, plan["entry_method"], case)
        except Exception as exc:
            print("case %s failed: %s" % (case["name"], exc), file=sys.stderr)
    return score


def main():
    plan = json.load(sys.stdin)
    with contextlib.redirect_stdout(sys.stderr):
        score = asyncio.run(drive(plan))
    print("SCORE: %d" % score)
    sys.stdout.flush()


main()
"#;

/// Source of the loader child script
pub fn loader_script() -> String {
    format!("{PRELUDE}{LOADER_BODY}")
}

/// Source of the functional driver script
pub fn functional_script() -> String {
    format!("{PRELUDE}{FUNCTIONAL_BODY}")
}
