// Tracking tests — attribute assignment, wrappers, traversal, and save guards
// exercised through the public facade.

use tendril::checkpoint::{Checkpointer, MemoryIo};
use tendril::nn::regularizer::l2;
use tendril::prelude::*;

// Helpers

fn wrapper(graph: &mut Graph, owner: ObjectId, name: &str, value: Value) -> ObjectId {
    graph
        .set_attr(owner, name, value)
        .unwrap()
        .as_object()
        .expect("container should have been wrapped")
}

fn try_save(graph: &mut Graph, root: ObjectId) -> Result<usize> {
    Checkpointer::new(MemoryIo::new()).save(graph, root, "ckpt")
}

fn units(graph: &Graph, layers: &[ObjectId]) -> Vec<usize> {
    layers
        .iter()
        .map(|&l| graph.layer_units(l).unwrap().unwrap())
        .collect()
}

struct HasList {
    model: ObjectId,
    layer_list: ObjectId,
    layers_with_updates: ObjectId,
    bn: ObjectId,
}

/// A model holding ten dense layers in a list grown through every list
/// operation, plus a batch norm in a second list.
fn has_list(g: &mut Graph) -> HasList {
    let model = Model::new().create(g);
    let d3 = Dense::new(3).create(g);
    let layer_list = wrapper(g, model, "layer_list", Value::list([Value::Object(d3)]));

    let d4 = Dense::new(4).create(g);
    g.list_mut(layer_list).unwrap().append(d4).unwrap();

    let d5 = Dense::new(5).create(g);
    let d6 = Dense::new(6).kernel_regularizer(l2(0.01)).create(g);
    g.list_mut(layer_list)
        .unwrap()
        .extend([Value::Object(d5), Value::Object(d6)])
        .unwrap();

    let d7 = Dense::new(7).bias_regularizer(l2(0.01)).create(g);
    let d8 = Dense::new(8).create(g);
    g.list_mut(layer_list)
        .unwrap()
        .concat_assign(&Value::list([Value::Object(d7), Value::Object(d8)]))
        .unwrap();

    let d9 = Dense::new(9).create(g);
    let d10 = Dense::new(10).create(g);
    let w9 = g.wrap(Value::list([Value::Object(d9)])).unwrap();
    let w10 = g.wrap(Value::list([Value::Object(d10)])).unwrap();
    g.list_mut(layer_list).unwrap().concat_assign(&w9).unwrap();
    g.list_mut(layer_list).unwrap().concat_assign(&w10).unwrap();

    let d11 = Dense::new(11).create(g);
    let d12 = Dense::new(12).create(g);
    let w = g
        .wrap(Value::list([Value::Object(d11), Value::Object(d12)]))
        .unwrap();
    let values = g.list(w.as_object().unwrap()).unwrap().values();
    g.list_mut(layer_list).unwrap().extend(values).unwrap();

    let bn = BatchNormalization::new().create(g).unwrap();
    let layers_with_updates = wrapper(g, model, "layers_with_updates", Value::list([Value::Object(bn)]));
    HasList {
        model,
        layer_list,
        layers_with_updates,
        bn,
    }
}

// Lists

#[test]
fn test_list_wrapper_reports_layers_in_order() {
    let mut g = Graph::new();
    let model = g.create_module("root");
    let d3 = Dense::new(3).create(&mut g);
    let list = wrapper(&mut g, model, "layers", Value::list([Value::Object(d3)]));
    let d4 = Dense::new(4).create(&mut g);
    g.list_mut(list).unwrap().append(d4).unwrap();
    let d5 = Dense::new(5).create(&mut g);
    let d6 = Dense::new(6).create(&mut g);
    g.list_mut(list)
        .unwrap()
        .extend([Value::Object(d5), Value::Object(d6)])
        .unwrap();

    let children = g.list_children(model).unwrap();
    assert_eq!(children, vec![("layers".to_string(), list)]);
    let layers = g.layers(list).unwrap();
    assert_eq!(units(&g, &layers), vec![3, 4, 5, 6]);
}

#[test]
fn test_has_list_structure() {
    let mut g = Graph::new();
    let m = has_list(&mut g);

    assert_eq!(g.build(m.model, Some(2)).unwrap(), 12);
    assert_eq!(g.layers(m.model).unwrap().len(), 11);
    let listed = g.layers(m.layer_list).unwrap();
    assert_eq!(listed.len(), 10);
    assert_eq!(units(&g, &listed), (3..=12).collect::<Vec<_>>());

    let mut combined = listed.clone();
    combined.extend(g.layers(m.layers_with_updates).unwrap());
    assert_eq!(combined, g.layers(m.model).unwrap());

    let children = g.list_children(m.model).unwrap();
    assert_eq!(
        children,
        vec![
            ("layer_list".to_string(), m.layer_list),
            ("layers_with_updates".to_string(), m.layers_with_updates),
        ]
    );
    assert_eq!(g.list_children(m.layer_list).unwrap().len(), 10);
}

#[test]
fn test_has_list_losses_and_updates_forwarded() {
    let mut g = Graph::new();
    let m = has_list(&mut g);
    g.build(m.model, Some(2)).unwrap();
    assert_eq!(g.losses(m.model).unwrap().len(), 2);

    assert!(g.updates(m.model).unwrap().is_empty());
    record_batch_statistics(&mut g, m.bn, &[0.0; 12], &[1.0; 12]).unwrap();
    assert_eq!(g.updates(m.bn).unwrap(), g.updates(m.model).unwrap());
    assert_eq!(g.apply_updates(m.model).unwrap(), 2);
}

#[test]
fn test_has_list_checkpoint_roundtrip() {
    let mut g = Graph::new();
    let m = has_list(&mut g);
    g.build(m.model, Some(2)).unwrap();
    let first = g.variables(m.model).unwrap()[0];
    assert_eq!(g.variable(first).unwrap().shape(), &[2, 3]);

    let saved = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
    g.set_value(first, &saved).unwrap();
    let mut ckpt = Checkpointer::new(MemoryIo::new());
    ckpt.save(&mut g, m.model, "ckpt").unwrap();
    g.set_value(first, &[0.0; 6]).unwrap();
    let status = ckpt.restore(&mut g, m.model, "ckpt").unwrap();
    status.assert_consumed().unwrap();
    assert_eq!(g.variable(first).unwrap().values(), &saved);
}

#[test]
fn test_variable_in_list_attribute_is_trainable() {
    let mut g = Graph::new();
    let m = has_list(&mut g);
    g.build(m.model, Some(2)).unwrap();
    let v = g.scalar_variable("v", 1.0).unwrap();
    g.set_attr(m.model, "var_list", Value::list([Value::Variable(v)]))
        .unwrap();
    assert!(g.variables(m.model).unwrap().contains(&v));
    assert!(g.trainable_variables(m.model).unwrap().contains(&v));
    assert!(!g.non_trainable_variables(m.model).unwrap().contains(&v));

    let first_kernel = g.weight(g.layers(m.layer_list).unwrap()[0], "kernel").unwrap();
    assert!(g.trainable_variables(m.model).unwrap().contains(&first_kernel));
}

#[test]
fn test_sub_model_in_list_is_tracked() {
    let mut g = Graph::new();
    let model = Model::new().create(&mut g);
    let v = g.scalar_variable("v", 1.0).unwrap();
    g.set_attr(model, "v", v).unwrap();
    assert!(g.trainable_variables(model).unwrap().contains(&v));

    let model2 = Model::new().create(&mut g);
    g.set_attr(model2, "m", Value::list([Value::Object(model)]))
        .unwrap();
    assert!(g.trainable_variables(model2).unwrap().contains(&v));
}

#[test]
fn test_layer_tracked_through_sequential() {
    let mut g = Graph::new();
    let ff = Sequential::create(&mut g).unwrap();
    for width in [50, 30, 5] {
        let dense = Dense::new(width).create(&mut g);
        Sequential::add(&mut g, ff, dense).unwrap();
    }
    let m2 = Model::new().create(&mut g);
    g.set_attr(m2, "ffnet", Value::list([Value::Object(ff)]))
        .unwrap();
    g.build(m2, Some(5)).unwrap();
    assert_eq!(g.trainable_variables(m2).unwrap().len(), 6);
}

#[test]
fn test_layer_collection_with_external_mutation() {
    let mut g = Graph::new();
    let root = g.create_module("root");
    let raw = SharedList::new();
    let list = wrapper(&mut g, root, "l", Value::List(raw.clone()));
    let layer = Dense::new(1).create(&mut g);
    raw.push(layer);
    assert_eq!(g.layers(list).unwrap(), vec![layer]);
}

#[test]
fn test_containers_in_separate_attributes() {
    let mut g = Graph::new();
    let model = Model::new().create(&mut g);
    let l1 = wrapper(&mut g, model, "l1", Value::list([]));
    let l2 = wrapper(&mut g, model, "l2", Value::list([]));
    let first = Model::new().create(&mut g);
    let second = Model::new().create(&mut g);
    g.list_mut(l1).unwrap().append(first).unwrap();
    g.list_mut(l2).unwrap().append(second).unwrap();
    assert_eq!(g.layers(model).unwrap(), vec![first, second]);
}

#[test]
fn test_no_dep_list_allows_insert_until_tracked() {
    let mut g = Graph::new();
    let a = Model::new().create(&mut g);
    g.set_attr(a, "l1", Value::no_dependency(Value::list([])))
        .unwrap();
    match g.get_attr(a, "l1").unwrap() {
        Some(Value::List(raw)) => raw.insert(1, 0_i64),
        other => panic!("expected a raw list, got {other:?}"),
    }
    try_save(&mut g, a).unwrap();

    let l2 = wrapper(&mut g, a, "l2", Value::list([]));
    let module = g.create_module("m");
    g.list_mut(l2).unwrap().insert(1, module).unwrap();
    let err = try_save(&mut g, a).unwrap_err();
    assert!(err.to_string().contains("A list element was replaced"));
}

// Mappings

#[test]
fn test_has_mapping() {
    let mut g = Graph::new();
    let model = Model::new().create(&mut g);
    let output = Dense::new(7).create(&mut g);
    let dict = wrapper(
        &mut g,
        model,
        "layer_dict",
        Value::dict([("output", Value::Object(output))]),
    );
    g.dict_mut(dict).unwrap().set("norm", Value::list([])).unwrap();
    g.dict_mut(dict).unwrap().set("dense", Value::list([])).unwrap();
    let dense_list = g.dict(dict).unwrap().get(&Key::from("dense")).unwrap();
    let norm_list = g.dict(dict).unwrap().get(&Key::from("norm")).unwrap();
    let (dense_list, norm_list) = (dense_list.as_object().unwrap(), norm_list.as_object().unwrap());

    let d5 = Dense::new(5).create(&mut g);
    let d6 = Dense::new(6).kernel_regularizer(l2(0.1)).create(&mut g);
    g.list_mut(dense_list)
        .unwrap()
        .extend([Value::Object(d5), Value::Object(d6)])
        .unwrap();
    for _ in 0..2 {
        let bn = BatchNormalization::new().create(&mut g).unwrap();
        g.list_mut(norm_list).unwrap().append(bn).unwrap();
    }

    assert_eq!(g.layers(model).unwrap().len(), 5);
    assert_eq!(g.layers(model).unwrap(), g.layers(dict).unwrap());
    assert_eq!(
        g.list_children(model).unwrap(),
        vec![("layer_dict".to_string(), dict)]
    );

    g.build(output, Some(6)).unwrap();
    let kernel = g.weight(output, "kernel").unwrap();
    g.set_value(kernel, &[1.0; 42]).unwrap();
    let mut ckpt = Checkpointer::new(MemoryIo::new());
    ckpt.save(&mut g, model, "ckpt").unwrap();
    g.set_value(kernel, &[0.0; 42]).unwrap();
    ckpt.restore(&mut g, model, "ckpt").unwrap();
    assert_eq!(g.variable(kernel).unwrap().values(), &[1.0; 42]);
}

#[test]
fn test_dict_layer_collection_with_external_mutation() {
    let mut g = Graph::new();
    let root = g.create_module("root");
    let raw = SharedDict::new();
    let dict = wrapper(&mut g, root, "wrapper", Value::Dict(raw.clone()));
    assert!(g.layers(dict).unwrap().is_empty());
    assert!(g.trainable_variables(dict).unwrap().is_empty());

    let layer1 = Dense::new(1).create(&mut g);
    let layer2 = Dense::new(1).create(&mut g);
    raw.insert("a", layer1);
    raw.insert("b", layer2);
    assert_eq!(g.layers(dict).unwrap(), vec![layer1, layer2]);
    assert!(g.trainable_variables(dict).unwrap().is_empty());
}

#[test]
fn test_dict_wrapper_bad_keys() {
    let mut g = Graph::new();
    let a = g.create_module("a");
    let d = wrapper(&mut g, a, "d", Value::dict::<&str>([]));
    g.dict_mut(d).unwrap().set(1_i64, Value::list([])).unwrap();
    let model = Model::new().create(&mut g);
    g.set_attr(model, "sub", a).unwrap();
    let err = try_save(&mut g, model).unwrap_err();
    assert!(err.to_string().contains("non-string key"));
}

#[test]
fn test_dict_wrapper_no_dependency() {
    let mut g = Graph::new();
    let a = g.create_module("a");
    g.set_attr(a, "d", Value::no_dependency(Value::dict::<&str>([])))
        .unwrap();
    if let Some(Value::Dict(raw)) = g.get_attr(a, "d").unwrap() {
        raw.insert(1_i64, Value::list([Value::Int(3)]));
    }
    assert_eq!(g.list_objects(a).unwrap(), vec![a]);
    let model = Model::new().create(&mut g);
    g.set_attr(model, "sub", a).unwrap();
    try_save(&mut g, model).unwrap();
}

#[test]
fn test_non_string_key_not_trackable_value() {
    let mut g = Graph::new();
    let a = g.create_module("a");
    let d = wrapper(&mut g, a, "d", Value::dict::<&str>([]));
    g.dict_mut(d).unwrap().set("a", Value::list([Value::Int(3)])).unwrap();
    g.dict_mut(d)
        .unwrap()
        .set(1_i64, Value::no_dependency(Value::list([Value::Int(3)])))
        .unwrap();
    let inner = g.dict(d).unwrap().get(&Key::from("a")).unwrap().as_object().unwrap();
    assert_eq!(g.list_objects(a).unwrap(), vec![a, d, inner]);
    let model = Model::new().create(&mut g);
    g.set_attr(model, "sub", a).unwrap();
    try_save(&mut g, model).unwrap();
}

#[test]
fn test_non_append_not_trackable() {
    let mut g = Graph::new();
    let a = g.create_module("a");
    let d = wrapper(&mut g, a, "d", Value::dict::<&str>([]));
    g.dict_mut(d).unwrap().set("a", Value::list([Value::Int(3)])).unwrap();
    g.dict_mut(d).unwrap().set(1_i64, 3_i64).unwrap();
    g.dict_mut(d).unwrap().set(1_i64, 2_i64).unwrap();
    assert_eq!(g.dict(d).unwrap().get(&Key::Int(1)), Some(Value::Int(2)));
    g.dict_mut(d).unwrap().remove(&Key::Int(1)).unwrap();

    let first = g.create_module("first");
    g.dict_mut(d).unwrap().set(2_i64, Value::no_dependency(first)).unwrap();
    let second = g.create_module("second");
    g.dict_mut(d).unwrap().set(2_i64, Value::no_dependency(second)).unwrap();
    assert_eq!(g.dict(d).unwrap().get(&Key::Int(2)), Some(Value::Object(second)));

    let inner = g.dict(d).unwrap().get(&Key::from("a")).unwrap().as_object().unwrap();
    assert_eq!(g.list_objects(a).unwrap(), vec![a, d, inner]);
    let model = Model::new().create(&mut g);
    g.set_attr(model, "sub", a).unwrap();
    try_save(&mut g, model).unwrap();
}

#[test]
fn test_pop_tracked_entry_blocks_save() {
    let mut g = Graph::new();
    let model = Model::new().create(&mut g);
    let d = wrapper(&mut g, model, "d", Value::dict::<&str>([]));
    g.dict_mut(d).unwrap().set("a", Value::list([])).unwrap();
    g.dict_mut(d).unwrap().remove(&Key::from("a")).unwrap();
    let err = try_save(&mut g, model).unwrap_err();
    assert!(err.is_save_blocking());
    assert!(err.to_string().contains("Unable to save"));
}

#[test]
fn test_external_dict_modification_blocks_save() {
    let mut g = Graph::new();
    let model = Model::new().create(&mut g);
    let external = SharedDict::new();
    g.set_attr(model, "d", external.clone()).unwrap();
    external.insert("a", Value::list([]));
    let err = try_save(&mut g, model).unwrap_err();
    assert!(err.to_string().contains("modified outside the wrapper"));
}

#[test]
fn test_overwrite_can_still_save() {
    let mut g = Graph::new();
    let model = Model::new().create(&mut g);
    let d = wrapper(&mut g, model, "d", Value::dict::<&str>([]));
    g.dict_mut(d).unwrap().set("a", Value::dict::<&str>([])).unwrap();
    g.dict_mut(d).unwrap().set("a", Value::dict::<&str>([])).unwrap();
    try_save(&mut g, model).unwrap();
}

#[test]
fn test_overwrite_tracked_key_with_new_trackable_can_save() {
    let mut g = Graph::new();
    let model = Model::new().create(&mut g);
    let first = Dense::new(1).create(&mut g);
    let second = Dense::new(1).create(&mut g);
    let d = wrapper(&mut g, model, "d", Value::dict([("layer", Value::Object(first))]));
    g.dict_mut(d).unwrap().set("layer", second).unwrap();
    try_save(&mut g, model).unwrap();
    assert_eq!(g.list_children(d).unwrap(), vec![("layer".to_string(), second)]);
}

#[test]
fn test_dict_keys_after_reassignment() {
    let mut g = Graph::new();
    let model = Model::new().create(&mut g);
    let d = wrapper(&mut g, model, "d", Value::dict([(1_i64, Value::Int(3))]));
    g.dict_mut(d).unwrap().set(1_i64, 3_i64).unwrap();
    assert_eq!(g.dict(d).unwrap().keys(), vec![Key::Int(1)]);
}

#[test]
fn test_dictionaries_basic() {
    let mut g = Graph::new();
    let a = Model::new().create(&mut g);
    let b = Model::new().create(&mut g);
    let attribute = wrapper(&mut g, a, "attribute", Value::dict([("b", Value::Object(b))]));
    let c = Model::new().create(&mut g);
    g.dict_mut(attribute).unwrap().set("c", Value::list([])).unwrap();
    let c_list = g
        .dict(attribute)
        .unwrap()
        .get(&Key::from("c"))
        .unwrap()
        .as_object()
        .unwrap();
    g.list_mut(c_list).unwrap().append(c).unwrap();

    let deps = g.list_objects(a).unwrap();
    assert!(deps.contains(&b) && deps.contains(&c));
    let names: Vec<String> = g
        .list_children(attribute)
        .unwrap()
        .into_iter()
        .map(|(n, _)| n)
        .collect();
    assert_eq!(names, vec!["b".to_string(), "c".to_string()]);
    assert_eq!(g.layers(a).unwrap(), vec![b, c]);
    assert_eq!(g.layers(attribute).unwrap(), vec![b, c]);
    assert_eq!(g.layers(c_list).unwrap(), vec![c]);
}

// Tuples

#[test]
fn test_has_tuple() {
    let mut g = Graph::new();
    let model = Model::new().create(&mut g);
    let d3 = Dense::new(3).create(&mut g);
    let d4 = Dense::new(4).kernel_regularizer(l2(0.1)).create(&mut g);
    let tuple = wrapper(
        &mut g,
        model,
        "layer_list",
        Value::tuple([Value::Object(d3), Value::Object(d4)]),
    );
    let bn = BatchNormalization::new().create(&mut g).unwrap();
    g.set_attr(model, "layers_with_updates", Value::tuple([Value::Object(bn)]))
        .unwrap();

    assert_eq!(g.build(model, Some(2)).unwrap(), 4);
    assert_eq!(g.layers(model).unwrap().len(), 3);
    assert_eq!(g.tuple(tuple).unwrap().len(), 2);
    assert_eq!(g.tuple(tuple).unwrap().get(1), Some(Value::Object(d4)));
    assert_eq!(g.losses(model).unwrap().len(), 1);
    assert!(g.updates(model).unwrap().is_empty());
}

#[test]
fn test_tuples_in_separate_attributes() {
    let mut g = Graph::new();
    let model = Model::new().create(&mut g);
    let first = Model::new().create(&mut g);
    let second = Model::new().create(&mut g);
    g.set_attr(model, "l1", Value::tuple([])).unwrap();
    g.set_attr(model, "l2", Value::tuple([])).unwrap();
    g.set_attr(model, "l1", Value::tuple([Value::Object(first)]))
        .unwrap();
    g.set_attr(model, "l2", Value::tuple([Value::Object(second)]))
        .unwrap();
    assert_eq!(g.layers(model).unwrap(), vec![first, second]);
}

// Interface

#[test]
fn test_no_dependency() {
    let mut g = Graph::new();
    let root = g.create_module("root");
    let hasdep = g.create_module("hasdep");
    let nodep = g.create_module("nodep");
    g.set_attr(root, "hasdep", hasdep).unwrap();
    g.set_attr(root, "nodep", Value::no_dependency(nodep)).unwrap();
    assert_eq!(
        g.list_children(root).unwrap(),
        vec![("hasdep".to_string(), hasdep)]
    );
    assert_eq!(g.get_attr(root, "nodep").unwrap(), Some(&Value::Object(nodep)));

    let nodeps = Model::new().create(&mut g);
    g.untracked(nodeps, |g| {
        g.set_attr(nodeps, "a", Value::list([])).unwrap();
        let b = g.create_module("b");
        g.set_attr(nodeps, "b", b).unwrap();
    })
    .unwrap();
    assert_eq!(g.list_objects(nodeps).unwrap(), vec![nodeps]);
}

#[test]
fn test_extra_variable_trainability() {
    let mut g = Graph::new();
    let m = Model::new().create(&mut g);
    let dense = Dense::new(1).create(&mut g);
    g.set_attr(m, "dense", dense).unwrap();
    let var = g.scalar_variable("var", 1.0).unwrap();
    g.set_attr(m, "var", var).unwrap();
    let frozen = g
        .create_variable("not_trainable_var", vec![], DType::F32, false, vec![2.0])
        .unwrap();
    g.set_attr(m, "not_trainable_var", frozen).unwrap();

    assert_eq!(g.layers(m).unwrap(), vec![dense]);
    assert_eq!(g.variables(m).unwrap(), vec![var, frozen]);
    assert_eq!(g.trainable_variables(m).unwrap(), vec![var]);
    assert_eq!(g.non_trainable_variables(m).unwrap(), vec![frozen]);

    g.set_trainable(m, false).unwrap();
    assert_eq!(g.variables(m).unwrap(), vec![var, frozen]);
    assert!(g.trainable_variables(m).unwrap().is_empty());
    assert_eq!(g.non_trainable_variables(m).unwrap(), vec![var, frozen]);
    g.set_trainable(m, true).unwrap();

    g.build(m, Some(1)).unwrap();
    let kernel = g.weight(dense, "kernel").unwrap();
    let bias = g.weight(dense, "bias").unwrap();
    assert_eq!(g.variables(dense).unwrap(), vec![kernel, bias]);
    assert_eq!(g.variables(m).unwrap(), vec![var, frozen, kernel, bias]);
    assert_eq!(g.trainable_variables(m).unwrap(), vec![var, kernel, bias]);

    g.set_trainable(dense, false).unwrap();
    assert_eq!(g.trainable_variables(m).unwrap(), vec![var]);
    assert_eq!(
        g.non_trainable_variables(m).unwrap(),
        vec![frozen, kernel, bias]
    );
}

#[test]
fn test_no_dependency_variable_not_owned() {
    let mut g = Graph::new();
    let m = Model::new().create(&mut g);
    let v = g.scalar_variable("notdep_var", 1.0).unwrap();
    g.set_attr(m, "notdep_var", Value::no_dependency(v)).unwrap();
    assert!(g.variables(m).unwrap().is_empty());
    assert_eq!(g.variable(v).unwrap().owner(), None);
}

// Properties

#[test]
fn test_traversal_is_deterministic() {
    let mut g = Graph::new();
    let m = has_list(&mut g);
    g.build(m.model, Some(2)).unwrap();
    assert_eq!(g.list_objects(m.model).unwrap(), g.list_objects(m.model).unwrap());
    assert_eq!(g.list_children(m.model).unwrap(), g.list_children(m.model).unwrap());
    assert_eq!(g.variables(m.model).unwrap(), g.variables(m.model).unwrap());
    assert_eq!(
        g.variable_paths(m.model, "/").unwrap(),
        g.variable_paths(m.model, "/").unwrap()
    );
}

#[test]
fn test_shared_child_listed_once() {
    let mut g = Graph::new();
    let a = g.create_module("a");
    let b = g.create_module("b");
    g.set_attr(a, "first", b).unwrap();
    g.set_attr(a, "second", b).unwrap();
    assert_eq!(g.list_objects(a).unwrap(), vec![a, b]);
    assert_eq!(g.list_children(a).unwrap().len(), 2);
}

#[test]
fn test_raw_alias_append_blocks_save() {
    let mut g = Graph::new();
    let root = g.create_module("root");
    let raw = SharedList::new();
    g.set_attr(root, "items", raw.clone()).unwrap();
    let sneaky = g.create_module("sneaky");
    raw.push(sneaky);
    let err = try_save(&mut g, root).unwrap_err();
    assert!(matches!(err, Error::StructuralMutation { .. }));
    assert!(err.to_string().contains("modified outside the wrapper"));
}

#[test]
fn test_integer_key_blocks_save() {
    let mut g = Graph::new();
    let root = g.create_module("root");
    let d = wrapper(&mut g, root, "d", Value::dict::<&str>([]));
    let child = g.create_module("child");
    g.dict_mut(d).unwrap().set(7_i64, child).unwrap();
    let err = try_save(&mut g, root).unwrap_err();
    assert!(matches!(err, Error::UnsupportedKey { .. }));
    assert!(err.to_string().contains("non-string key"));
}
