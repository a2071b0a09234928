use crate::utils::dual::Dual;

#[test]
fn pending_changes_do_not_touch_current() {
    let dual = Dual::new(1);
    *dual.pending_mut() = 2;
    assert_eq!(*dual.current(), 1);
    assert_eq!(*dual.pending(), 2);
}

#[test]
fn apply_promotes_pending() {
    let dual = Dual::new(1);
    *dual.pending_mut() = 2;
    assert_eq!(dual.apply(), 1);
    assert_eq!(*dual.current(), 2);
    assert_eq!(*dual.pending(), 2);
}

#[test]
fn revert_restores_current() {
    let dual = Dual::new(String::from("a"));
    dual.pending_mut().push('b');
    dual.revert();
    assert_eq!(&*dual.pending(), "a");
    assert_eq!(&*dual.current(), "a");
}
