//! End-to-end tests over an in-process connection: compose a world, bind a
//! host implementation, and call it through a service binding.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use wit_bind::prelude::*;

fn expr_type() -> TypeRef {
    TypeDescriptor::variant([
        (
            "add",
            Some(TypeDescriptor::tuple([
                TypeDescriptor::s32(),
                TypeDescriptor::s32(),
            ])),
        ),
        (
            "sub",
            Some(TypeDescriptor::record([
                ("left", TypeDescriptor::s32()),
                ("right", TypeDescriptor::s32()),
            ])),
        ),
        ("neg", Some(TypeDescriptor::s32())),
    ])
}

fn calculator_interface() -> InterfaceDescriptor {
    let expr = expr_type();
    let mut concat = FunctionSignature::new("concat");
    for i in 0..9 {
        concat = concat.with_param(format!("s{i}"), TypeDescriptor::string());
    }
    let concat = concat.with_result(TypeDescriptor::string());

    InterfaceDescriptor::new("demo/calculator")
        .with_type("expr", Arc::clone(&expr))
        .with_function(
            FunctionSignature::new("add")
                .with_param("left", TypeDescriptor::u32())
                .with_param("right", TypeDescriptor::u32())
                .with_result(TypeDescriptor::u32()),
        )
        .with_function(
            FunctionSignature::new("eval")
                .with_param("op", Arc::clone(&expr))
                .with_result(TypeDescriptor::s32()),
        )
        .with_function(
            FunctionSignature::new("echo")
                .with_param("op", Arc::clone(&expr))
                .with_result(expr),
        )
        .with_function(concat)
        .with_function(
            FunctionSignature::new("minmax")
                .with_param("values", TypeDescriptor::list(TypeDescriptor::u32()))
                .with_result(TypeDescriptor::tuple([
                    TypeDescriptor::u32(),
                    TypeDescriptor::u32(),
                ])),
        )
        .with_function(
            FunctionSignature::new("checked-div")
                .with_param("num", TypeDescriptor::u32())
                .with_param("den", TypeDescriptor::u32())
                .with_result(TypeDescriptor::result(
                    Some(TypeDescriptor::u32()),
                    Some(TypeDescriptor::string()),
                )),
        )
        .with_function(
            FunctionSignature::new("parse")
                .with_param("text", TypeDescriptor::string())
                .with_result(TypeDescriptor::result(
                    Some(TypeDescriptor::u32()),
                    Some(TypeDescriptor::string()),
                )),
        )
}

fn calculator_impl() -> HostImplementation {
    HostImplementation::new()
        .with_function("demo/calculator", "add", |_ctx, args| {
            match args.as_slice() {
                [Value::U32(a), Value::U32(b)] => Ok(Value::U32(a + b)),
                _ => Err(BindError::ProtocolViolation {
                    function: "add".to_string(),
                    message: "unexpected arguments".to_string(),
                }
                .into()),
            }
        })
        .with_function("demo/calculator", "eval", |_ctx, args| {
            let result = match args.as_slice() {
                [Value::Variant { case, payload }] => {
                    match (case.as_str(), payload.as_deref()) {
                        ("add", Some(Value::Tuple(parts))) => match parts.as_slice() {
                            [Value::S32(a), Value::S32(b)] => a + b,
                            _ => 0,
                        },
                        ("sub", Some(Value::Record(fields))) => {
                            let get = |name: &str| {
                                fields
                                    .iter()
                                    .find(|(n, _)| n == name)
                                    .and_then(|(_, v)| match v {
                                        Value::S32(x) => Some(*x),
                                        _ => None,
                                    })
                                    .unwrap_or(0)
                            };
                            get("left") - get("right")
                        }
                        ("neg", Some(Value::S32(x))) => -x,
                        _ => 0,
                    }
                }
                _ => 0,
            };
            Ok(Value::S32(result))
        })
        .with_function("demo/calculator", "echo", |_ctx, mut args| {
            args.pop().ok_or_else(|| {
                Error::from(BindError::ProtocolViolation {
                    function: "echo".to_string(),
                    message: "missing argument".to_string(),
                })
            })
        })
        .with_function("demo/calculator", "concat", |_ctx, args| {
            let mut joined = String::new();
            for arg in args {
                if let Value::String(s) = arg {
                    joined.push_str(&s);
                }
            }
            Ok(Value::String(joined))
        })
        .with_function("demo/calculator", "minmax", |_ctx, args| {
            let values: Vec<u32> = match args.as_slice() {
                [Value::List(elements)] => elements
                    .iter()
                    .filter_map(|v| match v {
                        Value::U32(x) => Some(*x),
                        _ => None,
                    })
                    .collect(),
                _ => Vec::new(),
            };
            let min = values.iter().copied().min().unwrap_or(0);
            let max = values.iter().copied().max().unwrap_or(0);
            Ok(Value::Tuple(vec![Value::U32(min), Value::U32(max)]))
        })
        .with_function("demo/calculator", "checked-div", |_ctx, args| {
            match args.as_slice() {
                [Value::U32(_), Value::U32(0)] => Ok(Value::Result(Err(Some(Box::new(
                    Value::String("division by zero".to_string()),
                ))))),
                [Value::U32(n), Value::U32(d)] => {
                    Ok(Value::Result(Ok(Some(Box::new(Value::U32(n / d))))))
                }
                _ => Err(CanonicalAbiError::MissingWireValue.into()),
            }
        })
        .with_function("demo/calculator", "parse", |_ctx, args| {
            // Fails natively; the adapter lowers the failure into the
            // declared error case.
            match args.as_slice() {
                [Value::String(s)] => match s.parse::<u32>() {
                    Ok(v) => Ok(Value::Result(Ok(Some(Box::new(Value::U32(v)))))),
                    Err(_) => Err(CanonicalAbiError::TypeMismatch {
                        expected: "number".to_string(),
                        got: s.clone(),
                    }
                    .into()),
                },
                _ => Err(CanonicalAbiError::MissingWireValue.into()),
            }
        })
}

fn counter_id() -> ResourceTypeId {
    ResourceTypeId::new("demo/counters", "counter")
}

fn counters_interface() -> InterfaceDescriptor {
    let id = counter_id();
    InterfaceDescriptor::new("demo/counters")
        .with_resource(
            ResourceType::new(id.clone())
                .with_constructor(vec![("start".to_string(), TypeDescriptor::u32())])
                .with_method(
                    FunctionSignature::new("increment").with_result(TypeDescriptor::u32()),
                )
                .with_destructor(),
        )
        .with_function(
            FunctionSignature::new("try-destroy")
                .with_param("c", TypeDescriptor::borrow(id))
                .with_result(TypeDescriptor::bool()),
        )
}

fn counters_impl(drops: Arc<AtomicUsize>) -> HostImplementation {
    let id = counter_id();
    HostImplementation::new()
        .with_resource(
            counter_id(),
            HostResourceImpl::new()
                .with_constructor(|_ctx, args| {
                    let start = match args.as_slice() {
                        [Value::U32(start)] => *start,
                        _ => 0,
                    };
                    Ok(Arc::new(AtomicU32::new(start)) as HostRep)
                })
                .with_method("increment", |_ctx, rep, _args| {
                    let counter = rep.downcast_ref::<AtomicU32>().ok_or_else(|| {
                        Error::from(BindError::ProtocolViolation {
                            function: "increment".to_string(),
                            message: "wrong representation".to_string(),
                        })
                    })?;
                    Ok(Value::U32(counter.fetch_add(1, Ordering::SeqCst) + 1))
                })
                .with_destructor(move |_rep| {
                    drops.fetch_add(1, Ordering::SeqCst);
                }),
        )
        .with_function("demo/counters", "try-destroy", move |ctx, args| {
            let handle = match args.as_slice() {
                [Value::Borrow(handle)] => *handle,
                _ => return Ok(Value::Bool(false)),
            };
            let blocked = ctx.tables.get_handle_table(&id).drop_own(handle).is_err();
            Ok(Value::Bool(blocked))
        })
}

fn connect(
    world: &WorldDescriptor,
    implementation: HostImplementation,
) -> ServiceBinding<InProcessConnection> {
    let mut connection = InProcessConnection::new();
    connection.install(bind_host(world, implementation).expect("bind host"));
    bind_service(world, connection)
}

fn calculator_binding() -> ServiceBinding<InProcessConnection> {
    let world =
        WorldDescriptor::compose(vec![], vec![calculator_interface()]).expect("compose");
    connect(&world, calculator_impl())
}

#[test]
fn add_two_numbers() {
    let mut binding = calculator_binding();
    let sum = binding
        .call("demo/calculator", "add", vec![2u32.into(), 3u32.into()])
        .expect("call");
    assert_eq!(sum, Value::U32(5));
}

#[test]
fn variant_arguments_reach_the_host_intact() {
    let mut binding = calculator_binding();
    let op = Value::variant(
        "sub",
        Some(Value::record([
            ("left", Value::S32(10)),
            ("right", Value::S32(4)),
        ])),
    );
    let result = binding
        .call("demo/calculator", "eval", vec![op])
        .expect("call");
    assert_eq!(result, Value::S32(6));
}

#[test]
fn variant_results_roundtrip_through_echo() {
    let mut binding = calculator_binding();
    for op in [
        Value::variant(
            "add",
            Some(Value::Tuple(vec![Value::S32(2), Value::S32(3)])),
        ),
        Value::variant(
            "sub",
            Some(Value::record([
                ("left", Value::S32(10)),
                ("right", Value::S32(4)),
            ])),
        ),
        Value::variant("neg", Some(Value::S32(-7))),
    ] {
        let echoed = binding
            .call("demo/calculator", "echo", vec![op.clone()])
            .expect("call");
        assert_eq!(echoed, op);
    }
}

// Nine strings flatten to eighteen scalars, past the direct-argument
// limit, so the arguments travel through a memory spill block.
#[test]
fn wide_parameter_lists_spill_through_memory() {
    let mut binding = calculator_binding();
    let args: Vec<Value> = (0..9).map(|i| Value::String(format!("s{i}"))).collect();
    let joined = binding
        .call("demo/calculator", "concat", args)
        .expect("call");
    assert_eq!(joined, Value::String("s0s1s2s3s4s5s6s7s8".to_string()));
}

#[test]
fn multi_value_results_return_through_a_retptr() {
    let mut binding = calculator_binding();
    let values = Value::List(vec![Value::U32(3), Value::U32(9), Value::U32(1)]);
    let result = binding
        .call("demo/calculator", "minmax", vec![values])
        .expect("call");
    assert_eq!(result, Value::Tuple(vec![Value::U32(1), Value::U32(9)]));
}

#[test]
fn declared_error_case_surfaces_as_call_failed() {
    let mut binding = calculator_binding();
    let ok = binding
        .call(
            "demo/calculator",
            "checked-div",
            vec![10u32.into(), 2u32.into()],
        )
        .expect("call");
    assert_eq!(ok, Value::U32(5));

    let err = binding
        .call(
            "demo/calculator",
            "checked-div",
            vec![1u32.into(), 0u32.into()],
        )
        .unwrap_err();
    assert!(err.is_call_failed());
    match err {
        Error::Bind(BindError::CallFailed { payload }) => {
            assert_eq!(
                payload,
                Some(Value::String("division by zero".to_string()))
            );
        }
        other => panic!("expected CallFailed, got {other:?}"),
    }
}

#[test]
fn native_failures_lower_into_the_declared_error_case() {
    let mut binding = calculator_binding();
    let err = binding
        .call("demo/calculator", "parse", vec!["nope".into()])
        .unwrap_err();
    match err {
        Error::Bind(BindError::CallFailed {
            payload: Some(Value::String(message)),
        }) => assert!(message.contains("nope")),
        other => panic!("expected CallFailed with message, got {other:?}"),
    }
}

#[test]
fn missing_implementation_fails_at_bind_time() {
    let world =
        WorldDescriptor::compose(vec![], vec![calculator_interface()]).expect("compose");
    let err = bind_host(&world, HostImplementation::new())
        .map(|_| ())
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Bind(BindError::MissingImplementation { .. })
    ));
}

#[test]
fn unknown_export_is_rejected() {
    let mut binding = calculator_binding();
    let err = binding
        .call("demo/calculator", "multiply", vec![2u32.into(), 3u32.into()])
        .unwrap_err();
    assert!(matches!(err, Error::Bind(BindError::UnknownExport { .. })));
}

#[test]
fn counter_resource_lifecycle() {
    let world =
        WorldDescriptor::compose(vec![], vec![counters_interface()]).expect("compose");
    let drops = Arc::new(AtomicUsize::new(0));
    let mut binding = connect(&world, counters_impl(Arc::clone(&drops)));
    let id = counter_id();

    let handle = binding
        .construct("demo/counters", &id, vec![Value::U32(0)])
        .expect("construct");
    assert_eq!(handle, 1);

    for expected in 1..=3u32 {
        let got = binding
            .call_method("demo/counters", &id, "increment", handle, vec![])
            .expect("increment");
        assert_eq!(got, Value::U32(expected));
    }

    binding
        .drop_resource("demo/counters", &id, handle)
        .expect("drop");
    assert_eq!(drops.load(Ordering::SeqCst), 1);

    let err = binding
        .call_method("demo/counters", &id, "increment", handle, vec![])
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Resource(ResourceError::UnknownHandle { handle: 1 })
    ));

    // A second drop neither succeeds nor re-runs the destructor
    let err = binding
        .drop_resource("demo/counters", &id, handle)
        .unwrap_err();
    assert!(err.is_resource());
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

// The receiver borrow is held for the call's duration, so a drop attempted
// from inside the call is refused instead of invalidating the reference.
#[test]
fn borrow_blocks_drop_for_the_duration_of_a_call() {
    let world =
        WorldDescriptor::compose(vec![], vec![counters_interface()]).expect("compose");
    let drops = Arc::new(AtomicUsize::new(0));
    let mut binding = connect(&world, counters_impl(Arc::clone(&drops)));
    let id = counter_id();

    let handle = binding
        .construct("demo/counters", &id, vec![Value::U32(5)])
        .expect("construct");
    let blocked = binding
        .call(
            "demo/counters",
            "try-destroy",
            vec![Value::Borrow(handle)],
        )
        .expect("call");
    assert_eq!(blocked, Value::Bool(true));
    assert_eq!(drops.load(Ordering::SeqCst), 0);

    // The borrow was released when the call returned
    binding
        .drop_resource("demo/counters", &id, handle)
        .expect("drop");
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn teardown_reports_forced_drops() {
    let world =
        WorldDescriptor::compose(vec![], vec![counters_interface()]).expect("compose");
    let drops = Arc::new(AtomicUsize::new(0));
    let mut binding = connect(&world, counters_impl(Arc::clone(&drops)));
    let id = counter_id();

    binding
        .construct("demo/counters", &id, vec![Value::U32(1)])
        .expect("construct");
    binding
        .construct("demo/counters", &id, vec![Value::U32(2)])
        .expect("construct");

    let report = binding.connection_mut().close();
    assert_eq!(report.forced_drops, 2);
    assert_eq!(report.leaked_borrows, 0);
    assert_eq!(drops.load(Ordering::SeqCst), 2);
}

#[cfg(feature = "async")]
#[tokio::test]
async fn deferred_calls_complete_through_the_async_binding() {
    let binding = AsyncServiceBinding::new(calculator_binding());
    let sum = binding
        .call("demo/calculator", "add", vec![2u32.into(), 3u32.into()])
        .await
        .expect("call");
    assert_eq!(sum, Value::U32(5));
}
