//! Walkthrough of the analytical queries docpipe was built for: counts,
//! averages, rankings and joins over `users` and `books` collections.
//!
//! Run with: cargo run --example queries

use serde_json::{Value as JsonValue, json};

use docpipe::{Catalog, Collection, Pipeline, Result};

fn show(catalog: &Catalog, title: &str, collection: &str, pipeline: JsonValue) -> Result<()> {
    let pipeline = Pipeline::parse(&pipeline)?;
    let result = catalog.aggregate(collection, &pipeline)?;
    println!("== {}", title);
    for doc in &result {
        println!("{}", serde_json::to_string(&doc.to_json())?);
    }
    println!();
    Ok(())
}

fn main() -> Result<()> {
    let mut catalog = Catalog::new();
    catalog.insert(
        "users",
        Collection::from_json(&json!([
            {
                "name": "Aurelia Gonzales",
                "age": 20,
                "gender": "female",
                "favoriteFruit": "banana",
                "isActive": false,
                "tags": ["enim", "id", "velit", "ad", "consequat"],
                "registered": "2015-02-11T04:22:39Z",
                "company": {"title": "YURTURE", "phone": "+1 (940) 501-3963",
                            "location": {"country": "USA"}}
            },
            {
                "name": "Kitty Snow",
                "age": 38,
                "gender": "female",
                "favoriteFruit": "apple",
                "isActive": true,
                "tags": ["enim", "culpa"],
                "registered": "2018-01-23T04:03:51Z",
                "company": {"title": "DIGITALUS", "phone": "+1 (949) 568-3470",
                            "location": {"country": "Germany"}}
            },
            {
                "name": "Hays Wise",
                "age": 27,
                "gender": "male",
                "favoriteFruit": "strawberry",
                "isActive": false,
                "tags": ["velit", "ad"],
                "registered": "2015-04-30T10:22:42Z",
                "company": {"title": "EXIAND", "phone": "+1 (986) 580-3562",
                            "location": {"country": "USA"}}
            },
            {
                "name": "Pace Barton",
                "age": 25,
                "gender": "male",
                "favoriteFruit": "banana",
                "isActive": true,
                "registered": "2016-04-21T07:42:15Z",
                "company": {"title": "QUILK", "phone": "+1 (940) 577-2362",
                            "location": {"country": "USA"}}
            }
        ]))?,
    );
    catalog.insert(
        "books",
        Collection::from_json(&json!([
            {"_id": 1, "title": "The Great Gatsby", "author_id": 100},
            {"_id": 2, "title": "1984", "author_id": 101}
        ]))?,
    );
    catalog.insert(
        "authors",
        Collection::from_json(&json!([
            {"_id": 100, "name": "F. Scott Fitzgerald"},
            {"_id": 101, "name": "George Orwell"}
        ]))?,
    );

    show(
        &catalog,
        "Number of active users",
        "users",
        json!([
            {"$match": {"isActive": true}},
            {"$count": "activeUsers"}
        ]),
    )?;

    show(
        &catalog,
        "Average age by gender",
        "users",
        json!([
            {"$group": {"_id": "$gender", "averageAge": {"$avg": "$age"}}}
        ]),
    )?;

    show(
        &catalog,
        "Top 2 favorite fruits",
        "users",
        json!([
            {"$group": {"_id": "$favoriteFruit", "count": {"$sum": 1}}},
            {"$sort": {"count": -1}},
            {"$limit": 2}
        ]),
    )?;

    show(
        &catalog,
        "Countries ranked by user count",
        "users",
        json!([
            {"$group": {"_id": "$company.location.country", "userCount": {"$sum": 1}}},
            {"$sort": {"userCount": -1}}
        ]),
    )?;

    show(
        &catalog,
        "Average number of tags per user",
        "users",
        json!([
            {"$addFields": {"numberOfTags": {"$size": {"$ifNull": ["$tags", []]}}}},
            {"$group": {"_id": null, "averageNumOfTags": {"$avg": "$numberOfTags"}}}
        ]),
    )?;

    show(
        &catalog,
        "Inactive users tagged 'velit'",
        "users",
        json!([
            {"$match": {"isActive": false, "tags": "velit"}},
            {"$project": {"name": 1, "age": 1}}
        ]),
    )?;

    show(
        &catalog,
        "Users with a +1 (940) phone number",
        "users",
        json!([
            {"$match": {"company.phone": {"$regex": r"^\+1 \(940\)"}}},
            {"$count": "usersWithSpecialPhoneNumber"}
        ]),
    )?;

    show(
        &catalog,
        "Users grouped by favorite fruit",
        "users",
        json!([
            {"$group": {"_id": "$favoriteFruit", "users": {"$push": "$name"}}}
        ]),
    )?;

    show(
        &catalog,
        "Books with author details",
        "books",
        json!([
            {"$lookup": {
                "from": "authors",
                "localField": "author_id",
                "foreignField": "_id",
                "as": "author_details"
            }},
            {"$addFields": {"author_details": {"$first": "$author_details"}}}
        ]),
    )?;

    Ok(())
}
