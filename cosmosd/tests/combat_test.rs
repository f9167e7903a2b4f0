//! Combat scenarios driven over HTTP

mod common;

use common::CosmosTest;
use serde_json::{json, Value};

/// Encounter with A (15, +0), B (15, +2), C (8, +0)
async fn three_way(cosmos: &CosmosTest) -> (String, u64, u64, u64) {
    let id = cosmos.create_encounter("Three way").await.unwrap();
    let a = cosmos.add_combatant(&id, "A", 30, 0).await.unwrap();
    let b = cosmos.add_combatant(&id, "B", 30, 2).await.unwrap();
    let c = cosmos.add_combatant(&id, "C", 30, 0).await.unwrap();
    cosmos.set_initiative(&id, a, 15).await.unwrap();
    cosmos.set_initiative(&id, b, 15).await.unwrap();
    cosmos.set_initiative(&id, c, 8).await.unwrap();
    (id, a, b, c)
}

async fn next(cosmos: &CosmosTest, id: &str) -> Value {
    let resp = cosmos.post_empty(&format!("/encounters/{}/next", id)).await.unwrap();
    assert_eq!(resp.status(), 200);
    resp.json().await.unwrap()
}

#[tokio::test]
async fn test_turn_order_and_round_wrap() {
    let cosmos = CosmosTest::start().await.expect("Failed to start server");
    let (id, a, b, c) = three_way(&cosmos).await;

    let started: Value = cosmos
        .post_empty(&format!("/encounters/{}/start", id))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(started["result"], b);
    assert_eq!(started["state"]["turn_order"], json!([b, a, c]));
    assert_eq!(started["state"]["round"], 1);

    assert_eq!(next(&cosmos, &id).await["result"], a);
    assert_eq!(next(&cosmos, &id).await["result"], c);

    let wrapped = next(&cosmos, &id).await;
    assert_eq!(wrapped["result"], b);
    assert_eq!(wrapped["state"]["round"], 2);
    let kinds: Vec<&str> = wrapped["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["type"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, vec!["round_started", "turn_changed"]);
}

#[tokio::test]
async fn test_initiative_locked_during_combat() {
    let cosmos = CosmosTest::start().await.expect("Failed to start server");
    let (id, a, ..) = three_way(&cosmos).await;
    cosmos.post_empty(&format!("/encounters/{}/start", id)).await.unwrap();

    let resp = cosmos
        .post_empty(&format!("/encounters/{}/combatants/{}/initiative", id, a))
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    let resp = cosmos.post_empty(&format!("/encounters/{}/initiative", id)).await.unwrap();
    assert_eq!(resp.status(), 409);

    let resp = cosmos.post_empty(&format!("/encounters/{}/clear", id)).await.unwrap();
    assert_eq!(resp.status(), 409);
}

#[tokio::test]
async fn test_burning_ticks_at_round_boundary() {
    let cosmos = CosmosTest::start().await.expect("Failed to start server");
    let (id, _a, _b, c) = three_way(&cosmos).await;

    let resp = cosmos
        .post(
            &format!("/encounters/{}/combatants/{}/status", id, c),
            &json!({ "tag": "burning" }),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    cosmos.post_empty(&format!("/encounters/{}/start", id)).await.unwrap();
    next(&cosmos, &id).await;
    next(&cosmos, &id).await;
    next(&cosmos, &id).await;

    let burned: Value = cosmos
        .get(&format!("/encounters/{}/combatants/{}", id, c))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(burned["current_hp"], 25);

    let log: Value = cosmos
        .get(&format!("/encounters/{}/log?kind=damage", id))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let log = log.as_array().unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0]["message"], "C takes 5 fire damage from burning");
    assert_eq!(log[0]["round"], 2);
}

#[tokio::test]
async fn test_damage_heal_and_dying() {
    let cosmos = CosmosTest::start().await.expect("Failed to start server");
    let id = cosmos.create_encounter("Brawl").await.unwrap();
    let brute = cosmos.add_combatant(&id, "Brute", 50, 0).await.unwrap();
    let base = format!("/encounters/{}/combatants/{}", id, brute);

    let hit: Value = cosmos
        .post(&format!("{}/damage", base), &json!({ "amount": 1000 }))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(hit["result"]["current_hp"], 0);
    assert_eq!(hit["result"]["health"], "dying");
    assert_eq!(hit["events"][0]["type"], "combatant_dying");

    let healed: Value = cosmos
        .post(&format!("{}/heal", base), &json!({ "amount": 80 }))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(healed["result"]["healed"], 50);
    assert_eq!(healed["result"]["current_hp"], 50);

    let set: Value = cosmos
        .put(&format!("{}/hp", base), &json!({ "value": 10 }))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(set["result"]["change"], -40);
    assert_eq!(set["result"]["health"], "critical");

    let resp = cosmos
        .post(&format!("{}/heal", base), &json!({ "amount": -3 }))
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_scaled_damage_uses_encounter_scale() {
    let cosmos = CosmosTest::start().await.expect("Failed to start server");
    let id = cosmos.create_encounter("Dogfight").await.unwrap();

    let resp = cosmos
        .put(&format!("/encounters/{}/scale", id), &json!({ "scale": "starship" }))
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["result"], "starship");
    assert_eq!(body["events"][0]["type"], "scale_changed");

    let corvette = cosmos.add_combatant(&id, "Corvette", 100, 0).await.unwrap();
    let base = format!("/encounters/{}/combatants/{}", id, corvette);

    let pistol: Value = cosmos
        .post(&format!("{}/damage", base), &json!({ "amount": 10, "from_scale": "personal" }))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(pistol["result"]["current_hp"], 100);

    let battery: Value = cosmos
        .post(&format!("{}/damage", base), &json!({ "amount": 3, "from_scale": "capital" }))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(battery["result"]["current_hp"], 70);
}

#[tokio::test]
async fn test_remove_turn_holder_mid_combat() {
    let cosmos = CosmosTest::start().await.expect("Failed to start server");
    let (id, a, b, c) = three_way(&cosmos).await;
    cosmos.post_empty(&format!("/encounters/{}/start", id)).await.unwrap();
    next(&cosmos, &id).await; // A

    let resp = cosmos
        .delete(&format!("/encounters/{}/combatants/{}", id, a))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["state"]["current_turn"], c);
    assert_eq!(body["state"]["turn_order"], json!([b, c]));

    let resp = cosmos
        .delete(&format!("/encounters/{}/combatants/{}", id, a))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_end_keeps_wounds_and_clears_initiative() {
    let cosmos = CosmosTest::start().await.expect("Failed to start server");
    let (id, a, ..) = three_way(&cosmos).await;
    cosmos.post_empty(&format!("/encounters/{}/start", id)).await.unwrap();
    cosmos
        .post(
            &format!("/encounters/{}/combatants/{}/damage", id, a),
            &json!({ "amount": 12 }),
        )
        .await
        .unwrap();

    let ended: Value = cosmos
        .post_empty(&format!("/encounters/{}/end", id))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(ended["state"]["phase"], "idle");
    assert_eq!(ended["state"]["current_turn"], Value::Null);
    for combatant in ended["state"]["combatants"].as_array().unwrap() {
        assert_eq!(combatant["initiative"], Value::Null);
    }

    let wounded: Value = cosmos
        .get(&format!("/encounters/{}/combatants/{}", id, a))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(wounded["current_hp"], 18);

    let resp = cosmos.post_empty(&format!("/encounters/{}/end", id)).await.unwrap();
    assert_eq!(resp.status(), 409);
}

#[tokio::test]
async fn test_snapshot_export_and_import() {
    let cosmos = CosmosTest::start().await.expect("Failed to start server");
    let (id, a, ..) = three_way(&cosmos).await;
    cosmos.post_empty(&format!("/encounters/{}/start", id)).await.unwrap();
    next(&cosmos, &id).await;

    let snapshot: Value = cosmos
        .get(&format!("/encounters/{}/snapshot", id))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(snapshot["is_active"], true);
    assert_eq!(snapshot["current_turn"], a);

    let resp = cosmos
        .post("/encounters/import", &json!({ "name": "Copy", "snapshot": snapshot }))
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let copy: Value = resp.json().await.unwrap();
    let copy_id = copy["id"].as_str().unwrap();

    let shown: Value = cosmos
        .get(&format!("/encounters/{}", copy_id))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(shown["current_turn"], a);
    assert_eq!(shown["phase"], "active");

    let mut broken = snapshot.clone();
    broken["current_turn"] = json!(999);
    let resp = cosmos
        .put(&format!("/encounters/{}/snapshot", copy_id), &broken)
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "invalid_snapshot");
}

#[tokio::test]
async fn test_character_sync_updates_stats_mid_combat() {
    let cosmos = CosmosTest::start().await.expect("Failed to start server");
    let (id, a, b, c) = three_way(&cosmos).await;
    cosmos.post_empty(&format!("/encounters/{}/start", id)).await.unwrap();

    let resp = cosmos
        .client
        .patch(format!("{}/encounters/{}/combatants/{}", cosmos.base_url(), id, c))
        .json(&json!({ "max_hp": 12, "initiative_modifier": 9 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["result"]["max_hp"], 12);
    assert_eq!(body["result"]["current_hp"], 12);
    assert_eq!(body["result"]["initiative_modifier"], 9);
    assert_eq!(body["state"]["turn_order"], json!([b, a, c]));

    let resp = cosmos
        .client
        .patch(format!("{}/encounters/{}/combatants/{}", cosmos.base_url(), id, c))
        .json(&json!({ "max_hp": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_damage_type_in_log() {
    let cosmos = CosmosTest::start().await.expect("Failed to start server");
    let id = cosmos.create_encounter("Firefight").await.unwrap();
    let vex = cosmos.add_combatant(&id, "Vex", 30, 0).await.unwrap();

    let resp = cosmos
        .post(
            &format!("/encounters/{}/combatants/{}/damage", id, vex),
            &json!({ "amount": 6, "damage_type": "Plasma" }),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let log: Value = cosmos
        .get(&format!("/encounters/{}/log?kind=damage", id))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(log[0]["message"], "Vex takes 6 plasma damage");
}
