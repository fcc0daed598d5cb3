use simtree::continuation::{ContinueRequest, continue_conversation, generate_tree};
use simtree::core::candidate::SENTINEL_LINE;
use simtree::core::types::{Party, RoleLabels};
use simtree::error::ErrorKind;
use simtree::frontier::frontier;
use simtree::io::file_store::FileStore;
use simtree::io::store::NodeStore;
use simtree::reader::{children_of, selected_only, tree_summary};
use simtree::select::{check_tree, create_custom_node, select};
use simtree::test_support::{
    ScriptedModel, candidate, generator, reply_json, seed_root, store_with_case, temp_file_store,
};
use simtree::tree::{NewCase, TreeMeta};
use simtree::writer::create_tree;

const OPENING: &str = "We propose returning the full deposit within 14 days.";

fn request(case_id: u64, tree_id: Option<u64>, goal: &str) -> ContinueRequest {
    ContinueRequest {
        case_id,
        tree_id,
        simulation_goal: goal.to_string(),
    }
}

fn valid_reply(opening: Party) -> String {
    reply_json(&candidate(&RoleLabels::default(), opening, "model opening"))
}

#[test]
fn leaf_root_grows_into_thirteen_nodes() {
    let (store, case_id) = store_with_case("Tenant withheld rent over an unreturned deposit.");
    let (tree_id, root) = seed_root(&store, case_id, OPENING, "Party A");
    let generator = generator(ScriptedModel::new().reply(valid_reply(Party::A)));

    let result = continue_conversation(&store, &generator, &request(case_id, Some(tree_id), "Settle"))
        .expect("continue");

    assert_eq!(result.error, None);
    assert_eq!(result.tree_id, Some(tree_id));
    assert_eq!(result.simulation_goal, "Settle");
    let tree = &result.scenarios_tree;
    assert_eq!(tree.level, 1);
    assert_eq!(tree.line, OPENING);
    assert_eq!(tree.responses.len(), 3);
    assert!(tree.responses.iter().all(|r| r.responses.len() == 3));

    let nodes = store.nodes_in_tree(tree_id).expect("nodes");
    assert_eq!(nodes.len(), 13);
    assert!(nodes.iter().filter(|n| n.id != root).all(|n| !n.selected));
    assert_eq!(generator.model().calls(), 1);

    let request = generator.model().last_request().expect("request recorded");
    assert!(request.system_prompt.contains(OPENING));
    assert!(request.system_prompt.contains("Settle"));
}

#[test]
fn selecting_a_reply_moves_the_frontier() {
    let (store, case_id) = store_with_case("facts");
    let (tree_id, root) = seed_root(&store, case_id, OPENING, "Party A");
    let generator = generator(ScriptedModel::new().reply(valid_reply(Party::A)));
    continue_conversation(&store, &generator, &request(case_id, Some(tree_id), "Settle"))
        .expect("continue");

    let first = children_of(&store, root).expect("children")[0].clone();
    select(&store, first.id).expect("select");

    assert_eq!(frontier(&store, tree_id).expect("frontier").id, first.id);
    assert_eq!(first.content, "reply 1");
}

#[test]
fn existing_children_are_replayed_without_the_model() {
    let (store, case_id) = store_with_case("facts");
    let (tree_id, _) = seed_root(&store, case_id, OPENING, "Party A");
    let generator = generator(ScriptedModel::new().reply(valid_reply(Party::A)));
    let first = continue_conversation(&store, &generator, &request(case_id, Some(tree_id), "Settle"))
        .expect("first continue");

    let replay = continue_conversation(&store, &generator, &request(case_id, Some(tree_id), "Settle"))
        .expect("replay");

    assert_eq!(generator.model().calls(), 1);
    assert_eq!(replay.error, None);
    assert_eq!(replay.scenarios_tree.line, OPENING);
    let placeholder = &generator.generation_config().placeholder_justification;
    for (stored, generated) in replay.scenarios_tree.responses.iter().zip(&first.scenarios_tree.responses) {
        assert_eq!(stored.line, generated.line);
        assert_eq!(stored.speaker, generated.speaker);
        assert_eq!(&stored.reflects_personality, placeholder);
        let stored_lines: Vec<&str> = stored.responses.iter().map(|r| r.line.as_str()).collect();
        let generated_lines: Vec<&str> = generated.responses.iter().map(|r| r.line.as_str()).collect();
        assert_eq!(stored_lines, generated_lines);
    }
    assert_eq!(store.nodes_in_tree(tree_id).expect("nodes").len(), 13);
}

#[test]
fn malformed_reply_commits_nothing() {
    let (store, case_id) = store_with_case("facts");
    let (tree_id, _) = seed_root(&store, case_id, OPENING, "Party A");
    let generator = generator(ScriptedModel::new().reply("Sure! Here is the tree: {oops"));

    let result = continue_conversation(&store, &generator, &request(case_id, Some(tree_id), "Settle"))
        .expect("continue");

    assert!(result.is_error());
    let error = result.error.as_deref().expect("error");
    assert!(error.starts_with("Failed to parse JSON response"));
    assert_eq!(result.raw_response.as_deref(), Some("Sure! Here is the tree: {oops"));
    assert_eq!(result.scenarios_tree.line, SENTINEL_LINE);
    assert_eq!(store.nodes_in_tree(tree_id).expect("nodes").len(), 1);
}

#[test]
fn malformed_new_tree_is_not_created() {
    let (store, case_id) = store_with_case("facts");
    let generator = generator(ScriptedModel::new().reply("[]"));

    let result =
        continue_conversation(&store, &generator, &request(case_id, None, "Settle")).expect("continue");

    assert!(result.is_error());
    assert_eq!(result.tree_id, None);
    assert!(store.trees_for_case(case_id).expect("trees").is_empty());
}

#[test]
fn backend_failure_is_upstream() {
    let (store, case_id) = store_with_case("facts");
    let (tree_id, _) = seed_root(&store, case_id, OPENING, "Party A");
    let generator = generator(ScriptedModel::new().fail("connection refused"));

    let err = continue_conversation(&store, &generator, &request(case_id, Some(tree_id), "Settle"))
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Upstream);
    assert_eq!(store.nodes_in_tree(tree_id).expect("nodes").len(), 1);
}

#[test]
fn unknown_case_and_foreign_tree_are_rejected() {
    let (store, case_id) = store_with_case("facts");
    let (tree_id, _) = seed_root(&store, case_id, OPENING, "Party A");
    let other_case = store
        .insert_case(NewCase {
            name: "Other".to_string(),
            context: "other facts".to_string(),
        })
        .expect("case");
    let generator = generator(ScriptedModel::new());

    let err = continue_conversation(&store, &generator, &request(99, None, "Settle")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = continue_conversation(&store, &generator, &request(other_case.id, Some(tree_id), "Settle"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(generator.model().calls(), 0);
}

#[test]
fn new_tree_is_speculative_and_headed_by_goal() {
    let (store, case_id) = store_with_case("facts");
    let generator = generator(ScriptedModel::new().reply(valid_reply(Party::B)));

    let result = continue_conversation(&store, &generator, &request(case_id, None, "Recover the deposit"))
        .expect("continue");

    let tree_id = result.tree_id.expect("tree created");
    let nodes = store.nodes_in_tree(tree_id).expect("nodes");
    assert_eq!(nodes.len(), 13);
    assert!(nodes.iter().all(|n| !n.selected));
    assert_eq!(
        frontier(&store, tree_id).unwrap_err().kind(),
        ErrorKind::NotFound
    );
    let summary = tree_summary(&store, tree_id).expect("summary");
    assert_eq!(summary.headline.as_deref(), Some("Recover the deposit"));
    assert_eq!(summary.node_count, 13);
}

#[test]
fn blank_goal_falls_back_to_default() {
    let (store, case_id) = store_with_case("facts");
    let generator = generator(ScriptedModel::new().reply(valid_reply(Party::A)));

    let result = continue_conversation(&store, &generator, &request(case_id, None, "   ")).expect("continue");

    assert_eq!(result.simulation_goal, generator.generation_config().default_goal);
}

#[test]
fn generated_tree_selects_first_branch_and_continues_from_its_leaf() {
    let (store, case_id) = store_with_case("facts");
    let generator = generator(
        ScriptedModel::new()
            .reply(valid_reply(Party::A))
            .reply(valid_reply(Party::A)),
    );

    let result = generate_tree(&store, &generator, case_id, "Settle").expect("generate");
    let tree_id = result.tree_id.expect("tree created");
    let path: Vec<String> = selected_only(&store, tree_id)
        .expect("path")
        .iter()
        .map(|n| n.content.clone())
        .collect();
    assert_eq!(path, vec!["model opening", "reply 1", "follow-up 1.1"]);
    assert!(check_tree(&store, tree_id).expect("check").is_empty());

    let leaf = frontier(&store, tree_id).expect("frontier");
    let next = continue_conversation(&store, &generator, &request(case_id, Some(tree_id), "Settle"))
        .expect("continue");

    assert_eq!(next.scenarios_tree.line, "follow-up 1.1");
    assert_eq!(store.nodes_in_tree(tree_id).expect("nodes").len(), 25);
    assert_eq!(children_of(&store, leaf.id).expect("children").len(), 3);
    let request = generator.model().last_request().expect("request recorded");
    assert!(request.system_prompt.contains("reply 1"));
}

#[test]
fn file_store_survives_reopening() {
    let (dir, store) = temp_file_store();
    let case = store
        .insert_case(NewCase {
            name: "Deposit dispute".to_string(),
            context: r#"{"parties": {"party_A": {"name": "Tenant"}}}"#.to_string(),
        })
        .expect("case");
    let generator = generator(ScriptedModel::new().reply(valid_reply(Party::A)));

    let result = generate_tree(&store, &generator, case.id, "Settle").expect("generate");
    let tree_id = result.tree_id.expect("tree created");

    let reopened = FileStore::new(store.path());
    assert_eq!(reopened.nodes_in_tree(tree_id).expect("nodes").len(), 13);
    assert_eq!(
        frontier(&reopened, tree_id).expect("frontier").content,
        "follow-up 1.1"
    );
    let request = generator.model().last_request().expect("request recorded");
    assert!(request.system_prompt.contains("Tenant"));
    drop(dir);
}

#[test]
fn unlabelled_root_lets_the_model_pick_the_opening_party() {
    let (store, case_id) = store_with_case("facts");
    let tree = create_tree(&store, case_id, TreeMeta::default()).expect("tree");
    let root = create_custom_node(&store, tree.id, None, OPENING, "Client").expect("root");
    let generator = generator(ScriptedModel::new().reply(valid_reply(Party::B)));

    let result = continue_conversation(&store, &generator, &request(case_id, Some(tree.id), "Settle"))
        .expect("continue");

    assert_eq!(result.error, None);
    let opening = &result.scenarios_tree;
    assert_eq!(opening.line, OPENING);
    assert_eq!(opening.speaker, "Party B");
    for reply in &opening.responses {
        assert_eq!(reply.speaker, "Party A");
        assert!(reply.responses.iter().all(|r| r.speaker == "Party B"));
    }
    let children = children_of(&store, root.id).expect("children");
    assert_eq!(children.len(), 3);
    assert!(children.iter().all(|c| c.role == "Party A"));
    assert_eq!(store.nodes_in_tree(tree.id).expect("nodes").len(), 13);
}

#[test]
fn unlabelled_root_still_requires_known_alternating_speakers() {
    let (store, case_id) = store_with_case("facts");
    let tree = create_tree(&store, case_id, TreeMeta::default()).expect("tree");
    create_custom_node(&store, tree.id, None, OPENING, "Client").expect("root");

    let mut unknown = candidate(&RoleLabels::default(), Party::A, "model opening");
    unknown.speaker = "Client".to_string();
    let mut repeated = candidate(&RoleLabels::default(), Party::A, "model opening");
    repeated.responses[1].speaker = "Party A".to_string();
    let generator = generator(
        ScriptedModel::new()
            .reply(reply_json(&unknown))
            .reply(reply_json(&repeated)),
    );

    let first = continue_conversation(&store, &generator, &request(case_id, Some(tree.id), "Settle"))
        .expect("continue");
    let error = first.error.as_deref().expect("error");
    assert!(error.contains("unknown speaker 'Client'"), "{error}");

    let second = continue_conversation(&store, &generator, &request(case_id, Some(tree.id), "Settle"))
        .expect("continue");
    let error = second.error.as_deref().expect("error");
    assert!(error.contains("does not alternate"), "{error}");

    assert_eq!(store.nodes_in_tree(tree.id).expect("nodes").len(), 1);
}
