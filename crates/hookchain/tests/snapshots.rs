//! Compensation snapshots copy parameter handles, not the values behind them.

use std::sync::{Arc, Mutex};

use hookchain::{Handler, HookContext, HookError, HookKey, Hooks, ParamValue};

type Seen = Arc<Mutex<Vec<String>>>;

fn observe_cart(seen: &Seen) -> Handler {
    let seen = Arc::clone(seen);
    Handler::from_fn(|_| Ok(()))
        .with_compensation(move |snapshot| {
            let cart = snapshot
                .param::<Mutex<Vec<String>>>("cart")
                .map(|cart| {
                    let items = cart.lock().expect("lock").join(",");
                    items
                })
                .unwrap_or_default();
            let label = snapshot
                .param::<String>("label")
                .map(|label| label.as_str().to_owned())
                .unwrap_or_default();
            seen.lock().expect("lock").push(format!("{label}|{cart}"));
            Ok(())
        })
        .with_name("observe")
}

#[test]
fn in_place_mutation_is_visible_to_snapshot_but_replacement_is_not() {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let hooks = Hooks::new();
    let observe = HookKey::from("observe");
    let mutate = HookKey::from("mutate");
    hooks.register(&observe, observe_cart(&seen));
    hooks.register(
        &mutate,
        Handler::from_fn(|ctx| {
            if let Some(cart) = ctx.param::<Mutex<Vec<String>>>("cart") {
                cart.lock().expect("lock").push(String::from("added later"));
            }
            ctx.set_param("label", String::from("replaced"));
            Err(HookError::msg("checkout failed"))
        }),
    );

    let ctx = HookContext::new();
    ctx.set_param("cart", Mutex::new(vec![String::from("book")]));
    ctx.set_param("label", String::from("original"));
    hooks.dispatch(&observe, &ctx);
    hooks.dispatch(&mutate, &ctx);

    assert_eq!(
        *seen.lock().expect("lock"),
        vec!["original|book,added later"]
    );
}

#[test]
fn removed_parameter_is_still_in_earlier_snapshot() {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let hooks = Hooks::new();
    let key = HookKey::from("observe");
    hooks.register(&key, observe_cart(&seen));

    let ctx = HookContext::new();
    ctx.set_param("label", String::from("kept"));
    hooks.dispatch(&key, &ctx);
    assert!(ctx.remove_param("label").is_some());
    ctx.abort_with_error(HookError::msg("late failure"));

    assert_eq!(*seen.lock().expect("lock"), vec!["kept|"]);
}

#[test]
fn shared_values_keep_their_allocation() {
    let ctx = HookContext::new();
    let value: ParamValue = Arc::new(42_u64);
    ctx.set_param_value("answer", Arc::clone(&value));

    let snapshot = ctx.snapshot();
    let read = snapshot.param_value("answer").expect("answer in snapshot");

    assert!(Arc::ptr_eq(&value, &read));
    assert_eq!(snapshot.param::<u64>("answer").as_deref(), Some(&42));
}
