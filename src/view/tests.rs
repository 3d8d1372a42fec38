use assert_call::{call, CallRecorder};
use rstest::rstest;

use super::*;
use crate::{core::Runtime, test_helpers::call_on_drop};

fn props<T: std::fmt::Debug + 'static>(
    value: impl Into<Awaitable<T, String>>,
) -> AsyncViewProps<T, String, ()> {
    AsyncViewProps::new(value, |v: Option<T>| call!("render {v:?}"))
}

#[rstest]
#[case(Awaitable::Value(5), "render Some(5)")]
#[case(Awaitable::Value(0), "render Some(0)")]
#[case(Awaitable::Value(-1), "render Some(-1)")]
fn plain_value_renders_immediately(
    #[case] value: Awaitable<i32, String>,
    #[case] expected: &str,
) {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let view = AsyncView::mount(props(value));
    cr.verify(expected);
    assert_eq!(view.status(), Status::Resolved);
    assert!(!view.is_observing());
    rt.flush();
    cr.verify(());
}

#[test]
fn plain_empty_values_render_as_resolved() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let _unit = AsyncView::mount(props(Awaitable::Value(())));
    let _none = AsyncView::mount(props(Awaitable::Value(None::<i32>)));
    let _vec = AsyncView::mount(props(Awaitable::Value(Vec::<i32>::new())));
    rt.flush();
    cr.verify(["render Some(())", "render Some(None)", "render Some([])"]);
}

#[test]
fn pending_then_resolved() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let (c, settler) = Computation::<i32, String>::pending();
    let view = AsyncView::mount(props(c));
    cr.verify("render None");
    assert_eq!(view.status(), Status::Pending);
    assert!(view.is_observing());

    settler.resolve(1);
    cr.verify(());
    rt.flush();
    cr.verify("render Some(1)");
    assert_eq!(view.display_state(), AsyncState::Resolved(1));
}

#[test]
fn replaced_computation_is_ignored() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let (p, p_settler) = Computation::<i32, String>::pending();
    let (q, q_settler) = Computation::<i32, String>::pending();
    let view = AsyncView::mount(props(p));
    view.set_value(q);
    cr.verify(["render None", "render None"]);

    q_settler.resolve(2);
    rt.flush();
    cr.verify("render Some(2)");

    p_settler.resolve(1);
    rt.flush();
    cr.verify(());
    assert_eq!(view.display_state(), AsyncState::Resolved(2));
}

#[test]
fn replaced_computation_settled_first_is_ignored() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let (p, p_settler) = Computation::<i32, String>::pending();
    let (q, q_settler) = Computation::<i32, String>::pending();
    let view = AsyncView::mount(props(p));
    p_settler.resolve(1);
    view.set_value(q);
    rt.flush();
    cr.verify(["render None", "render None"]);

    q_settler.resolve(2);
    rt.flush();
    cr.verify("render Some(2)");
}

#[test]
fn same_computation_is_not_observed_again() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let (c, settler) = Computation::<i32, String>::pending();
    let view = AsyncView::mount(props(c.clone()));
    view.update(props(c.clone()));
    cr.verify(["render None", "render None"]);

    settler.resolve(3);
    rt.flush();
    cr.verify("render Some(3)");
}

#[test]
fn views_do_not_share_observations() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let (a, a_settler) = Computation::<i32, String>::pending();
    let (b, b_settler) = Computation::<i32, String>::pending();
    let _va = AsyncView::mount(AsyncViewProps::new(a, |v| call!("a {v:?}")));
    let _vb = AsyncView::mount(AsyncViewProps::new(b, |v| call!("b {v:?}")));
    cr.verify(["a None", "b None"]);

    b_settler.resolve(2);
    rt.flush();
    cr.verify("b Some(2)");
    a_settler.resolve(1);
    rt.flush();
    cr.verify("a Some(1)");
}

#[test]
fn previously_resolved_computation_renders_immediately() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let (c, settler) = Computation::<i32, String>::pending();
    let first = AsyncView::mount(props(c.clone()));
    settler.resolve(7);
    rt.flush();
    first.unmount();
    cr.verify(["render None", "render Some(7)"]);

    let second = AsyncView::mount(props(c));
    cr.verify("render Some(7)");
    assert!(!second.is_observing());
    rt.flush();
    cr.verify(());
}

#[test]
fn rejection_is_raised_to_boundary_once() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let boundary = ErrorBoundary::new(|e: &String| call!("caught {e}"));
    let (c, settler) = Computation::<i32, String>::pending();
    let view = AsyncView::mount_in(props(c), &boundary);
    cr.verify("render None");

    settler.reject("boom".to_string());
    rt.flush();
    cr.verify("caught boom");
    assert_eq!(view.take_output(), None);
    assert_eq!(view.status(), Status::Rejected);

    view.update(props(Awaitable::Value(1)));
    rt.flush();
    cr.verify(());

    boundary.reset();
    view.update(props(Awaitable::Value(1)));
    cr.verify("render Some(1)");
}

#[test]
fn rejection_without_boundary_is_kept_as_output() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let c = Computation::<i32, String>::rejected("e".to_string());
    let view = AsyncView::mount(props(c));
    cr.verify("render None");
    assert_eq!(view.take_output(), Some(Ok(())));

    rt.flush();
    cr.verify(());
    assert_eq!(view.take_output(), Some(Err("e".to_string())));
    assert_eq!(view.take_output(), None);
}

#[test]
fn catch_maps_error_to_value() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let boundary = ErrorBoundary::new(|e: &String| call!("caught {e}"));
    let (c, settler) = Computation::<i32, String>::pending();
    let _view = AsyncView::mount_in(props(c).catch(|e: String| e.len() as i32), &boundary);
    settler.reject("four".to_string());
    rt.flush();
    cr.verify(["render None", "render Some(4)"]);
    assert!(!boundary.has_caught());
}

#[test]
fn waiting_replaces_none() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let (c, settler) = Computation::<i32, String>::pending();
    let _view = AsyncView::mount(props(c).waiting(|| -1));
    settler.resolve(1);
    rt.flush();
    cr.verify(["render Some(-1)", "render Some(1)"]);
}

#[test]
fn no_render_after_unmount() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let boundary = ErrorBoundary::new(|e: &String| call!("caught {e}"));
    let (c, settler) = Computation::<i32, String>::pending();
    let view = AsyncView::mount_in(props(c.clone()), &boundary);
    view.unmount();
    cr.verify("render None");

    settler.reject("late".to_string());
    rt.flush();
    cr.verify(());
    assert!(!boundary.has_caught());
    assert_eq!(settle_record(&c).state(), AsyncState::Rejected("late".to_string()));
}

#[test]
fn unmount_after_settle_before_flush() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let (c, settler) = Computation::<i32, String>::pending();
    let view = AsyncView::mount(props(c));
    settler.resolve(1);
    drop(view);
    rt.flush();
    cr.verify("render None");
}

#[test]
fn replaced_rejection_is_never_shown() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let boundary = ErrorBoundary::new(|e: &String| call!("caught {e}"));
    let (p, p_settler) = Computation::<i32, String>::pending();
    let view = AsyncView::mount_in(props(p), &boundary);
    view.set_value(Awaitable::Value(5));
    p_settler.reject("stale".to_string());
    rt.flush();
    cr.verify(["render None", "render Some(5)"]);
    assert!(!boundary.has_caught());
}

#[test]
fn update_replaces_render() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let (c, settler) = Computation::<i32, String>::pending();
    let view = AsyncView::mount(props(c.clone()));
    view.update(AsyncViewProps::new(c, |v| call!("new {v:?}")));
    settler.resolve(1);
    rt.flush();
    cr.verify(["render None", "new None", "new Some(1)"]);
}

#[test]
fn settle_and_update_in_same_turn_renders_once_per_pass() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let (c, settler) = Computation::<i32, String>::pending();
    let view = AsyncView::mount(props(c.clone()));
    settler.resolve(1);
    rt.run_tasks(Some(TaskKind::SETTLE));
    view.update(props(c));
    rt.flush();
    cr.verify(["render None", "render Some(1)"]);
}

#[test]
fn output_is_available_to_caller() {
    let mut rt = Runtime::new();
    let (c, settler) = Computation::<i32, String>::pending();
    let view = AsyncView::mount(AsyncViewProps::new(c, |v: Option<i32>| v.map(|v| v * 10)));
    assert_eq!(view.take_output(), Some(Ok(None)));
    settler.resolve(4);
    rt.flush();
    assert!(view.with_output(|o| o == Some(&Ok(Some(40)))));
}

#[test]
fn session_invalidate_suppresses_callback() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let (c, settler) = Computation::<i32, String>::pending();
    let session = ObservationSession::start(&c, |s| call!("settled {s:?}"));
    assert_eq!(session.computation_id(), c.id());
    session.invalidate();
    settler.resolve(1);
    rt.flush();
    cr.verify(());

    let (c, settler) = Computation::<i32, String>::pending();
    let _session = ObservationSession::start(&c, |s| call!("settled {s:?}"));
    settler.resolve(2);
    rt.flush();
    cr.verify("settled Resolved(2)");
}

#[test]
fn unmount_releases_hooks() {
    let _rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let (c, _settler) = Computation::<i32, String>::pending();
    let guard = call_on_drop("drop render");
    let view = AsyncView::mount(AsyncViewProps::new(c, move |_: Option<i32>| {
        let _guard = &guard;
    }));
    cr.verify(());
    view.unmount();
    cr.verify("drop render");
}

#[test]
fn mount_with_default_props() {
    let mut rt = Runtime::new();
    let view = AsyncView::<i32, String, ()>::mount(AsyncViewProps::default());
    assert_eq!(view.take_output(), Some(Ok(())));
    assert_eq!(view.display_state(), AsyncState::Resolved(0));
    rt.flush();
    assert_eq!(view.take_output(), None);
}

#[test]
fn record_recovers_after_runtime_drop() {
    let mut cr = CallRecorder::new();
    let (c, settler) = Computation::<i32, String>::pending();
    {
        let _rt = Runtime::new();
        let _view = AsyncView::mount(props(c.clone()));
        settler.resolve(7);
    }
    assert_eq!(settle_record(&c).status(), Status::Pending);

    let mut rt = Runtime::new();
    let second = AsyncView::mount(props(c.clone()));
    rt.flush();
    assert_eq!(second.status(), Status::Resolved);
    assert_eq!(settle_record(&c).state(), AsyncState::Resolved(7));

    let third = AsyncView::mount(props(c));
    assert_eq!(third.status(), Status::Resolved);
    cr.verify([
        "render None",
        "render None",
        "render Some(7)",
        "render Some(7)",
    ]);
}
