use palaver_test_utils::AssetsBuilder;
use serde_json::json;

fn rwanda() -> serde_json::Value {
    json!({
        "name": "Rwanda",
        "children": [
            {
                "name": "Kigali City",
                "aliases": ["Kigali"],
                "children": [
                    {
                        "name": "Gasabo",
                        "children": [{"name": "Central"}, {"name": "Remera"}]
                    },
                    {
                        "name": "Nyarugenge",
                        "children": [{"name": "Central", "aliases": ["Centre"]}]
                    }
                ]
            }
        ]
    })
}

#[tokio::test]
async fn test_same_name_disambiguated_by_parent() {
    let assets = AssetsBuilder::new().locations(rwanda()).build().unwrap();
    let hierarchies = assets.locations().await.unwrap();
    let hierarchy = &hierarchies[0];

    let central = hierarchy.find_by_name("central", 3, None);
    assert_eq!(central.len(), 2);

    let gasabo = hierarchy.find_by_name("Gasabo", 2, None);
    assert_eq!(gasabo.len(), 1);

    let matches = hierarchy.find_by_name("Central", 3, Some(gasabo[0].id()));
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].path(), "Rwanda > Kigali City > Gasabo > Central");

    let nyarugenge = hierarchy.find_by_name("Nyarugenge", 2, None);
    let by_alias = hierarchy.find_by_name("centre", 3, Some(nyarugenge[0].id()));
    assert_eq!(by_alias[0].path(), "Rwanda > Kigali City > Nyarugenge > Central");
}

#[tokio::test]
async fn test_exact_path_bypasses_level_lookup() {
    let assets = AssetsBuilder::new().locations(rwanda()).build().unwrap();
    let hierarchy = &assets.locations().await.unwrap()[0];

    let found = hierarchy.find_by_name("rwanda>kigali city> nyarugenge >CENTRAL", 1, None);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].level(), 3);
    assert_eq!(found[0].name(), "Central");

    // a path that doesn't exist falls back to name lookup and finds nothing
    assert!(hierarchy
        .find_by_name("Rwanda > Nowhere", 1, None)
        .is_empty());
}
