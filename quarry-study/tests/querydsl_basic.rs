use quarry_core::prelude::*;
use quarry_core::test_utils::TestDatabase;
use quarry_core::{QuarryError, Value};
use quarry_study::fixture::{self, Fixture};
use quarry_study::{Member, MemberDto, QMember, QTeam, Team, UserDto, create_schema};

async fn setup() -> (TestDatabase, Session, Fixture) {
    let db = TestDatabase::sqlite().await.expect("pool");
    create_schema(db.pool()).await.expect("schema");
    let session = db.session().await.expect("session");
    let data = fixture::seed(&session).await.expect("fixture");
    (db, session, data)
}

fn usernames(members: &[Member]) -> Vec<&str> {
    members.iter().filter_map(Member::username).collect()
}

#[tokio::test]
async fn native_sql_finds_member1() {
    let (_db, session, _) = setup().await;

    let found = session
        .native_query::<Member>(
            "SELECT m.member_id, m.username, m.age, m.team_id FROM member m WHERE m.username = ?",
            vec![Value::from("member1")],
        )
        .await
        .expect("native query");

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].username(), Some("member1"));
    assert_eq!(found[0].age(), 10);
}

#[tokio::test]
async fn typed_query_finds_member1() {
    let (_db, session, _) = setup().await;
    let query = session.query();
    let m = QMember::new("m");

    let found = query
        .select_from(&m)
        .filter(m.username.eq("member1"))
        .fetch_one()
        .await
        .expect("member1");

    assert_eq!(found.username(), Some("member1"));
    assert_eq!(found.age(), 10);
}

#[tokio::test]
async fn search_with_chained_conditions() {
    let (_db, session, _) = setup().await;
    let query = session.query();
    let member = QMember::member();

    let found = query
        .select_from(&member)
        .filter(member.username.eq("member1").and(member.age.between(10, 30)))
        .fetch_one()
        .await
        .expect("member1");

    assert_eq!(found.username(), Some("member1"));
    assert_eq!(found.age(), 10);
}

#[tokio::test]
async fn search_with_condition_list() {
    let (_db, session, _) = setup().await;
    let query = session.query();
    let member = QMember::member();

    let found = query
        .select_from(&member)
        .filter_all([member.username.eq("member1"), member.age.eq(10)])
        .fetch()
        .await
        .expect("search");

    assert_eq!(usernames(&found), vec!["member1"]);
}

#[tokio::test]
async fn absent_conditions_are_skipped() {
    let (_db, session, _) = setup().await;
    let query = session.query();
    let member = QMember::member();

    let username: Option<&str> = Some("member1");
    let age: Option<i32> = None;
    let found = query
        .select_from(&member)
        .filter_all([
            username.map(|name| member.username.eq(name)),
            age.map(|age| member.age.eq(age)),
        ])
        .fetch()
        .await
        .expect("search");

    assert_eq!(usernames(&found), vec!["member1"]);
}

#[tokio::test]
async fn result_fetch_variants() {
    let (_db, session, _) = setup().await;
    let query = session.query();
    let member = QMember::member();

    let all = query.select_from(&member).fetch().await.expect("fetch");
    assert_eq!(all.len(), 4);

    let one = query
        .select_from(&member)
        .filter(member.username.eq("member1"))
        .fetch_one()
        .await
        .expect("fetch_one");
    assert_eq!(one.username(), Some("member1"));

    let first = query
        .select_from(&member)
        .order_by(member.id.asc())
        .fetch_first()
        .await
        .expect("fetch_first");
    assert_eq!(first.and_then(|m| m.username().map(str::to_owned)).as_deref(), Some("member1"));

    let page = query
        .select_from(&member)
        .fetch_results()
        .await
        .expect("fetch_results");
    assert_eq!(page.total, 4);
    assert_eq!(page.results.len(), 4);

    let count = query.select_from(&member).fetch_count().await.expect("count");
    assert_eq!(count, 4);
}

#[tokio::test]
async fn fetch_one_rejects_zero_and_many_rows() {
    let (_db, session, _) = setup().await;
    let query = session.query();
    let member = QMember::member();

    let none = query
        .select_from(&member)
        .filter(member.username.eq("nobody"))
        .fetch_one()
        .await;
    assert!(matches!(none, Err(QuarryError::NoResult)));

    let many = query.select_from(&member).fetch_one().await;
    assert!(matches!(many, Err(QuarryError::NonUniqueResult)));

    let optional = query
        .select_from(&member)
        .filter(member.username.eq("nobody"))
        .fetch_optional()
        .await
        .expect("fetch_optional");
    assert!(optional.is_none());
}

#[tokio::test]
async fn sort_by_age_desc_then_username_nulls_last() {
    let (_db, session, _) = setup().await;
    for mut extra in [
        Member::without_username(100),
        Member::new("member5", 100),
        Member::new("member6", 100),
    ] {
        session.persist(&mut extra).await.expect("persist");
    }
    let query = session.query();
    let member = QMember::member();

    let found = query
        .select_from(&member)
        .filter(member.age.eq(100))
        .order_by(member.age.desc())
        .order_by(member.username.asc().nulls_last())
        .fetch()
        .await
        .expect("sorted");

    assert_eq!(found.len(), 3);
    assert_eq!(found[0].username(), Some("member5"));
    assert_eq!(found[1].username(), Some("member6"));
    assert_eq!(found[2].username(), None);
}

#[tokio::test]
async fn paging_returns_requested_window() {
    let (_db, session, _) = setup().await;
    let query = session.query();
    let member = QMember::member();

    let found = query
        .select_from(&member)
        .order_by(member.username.desc())
        .offset(1)
        .limit(2)
        .fetch()
        .await
        .expect("page");

    assert_eq!(usernames(&found), vec!["member3", "member2"]);
}

#[tokio::test]
async fn paging_with_total_count() {
    let (_db, session, _) = setup().await;
    let query = session.query();
    let member = QMember::member();

    let page = query
        .select_from(&member)
        .order_by(member.username.desc())
        .offset(1)
        .limit(2)
        .fetch_results()
        .await
        .expect("page");

    assert_eq!(page.total, 4);
    assert_eq!(page.limit, Some(2));
    assert_eq!(page.offset, 1);
    assert_eq!(usernames(&page.results), vec!["member3", "member2"]);
}

#[tokio::test]
async fn aggregation_over_all_members() {
    let (_db, session, _) = setup().await;
    let query = session.query();
    let member = QMember::member();

    let count = member.count();
    let sum = member.age.sum();
    let avg = member.age.avg();
    let max = member.age.max();
    let min = member.age.min();
    let row = query
        .select_tuple((&count, &sum, &avg, &max, &min))
        .from(&member)
        .fetch_one()
        .await
        .expect("aggregates");

    assert_eq!(row.get(&count), Some(4));
    assert_eq!(row.get(&sum), Some(100));
    assert_eq!(row.get(&avg), Some(25.0));
    assert_eq!(row.get(&max), Some(40));
    assert_eq!(row.get(&min), Some(10));
}

#[tokio::test]
async fn average_age_per_team() {
    let (_db, session, _) = setup().await;
    let query = session.query();
    let member = QMember::member();
    let team = QTeam::team();

    let avg = member.age.avg();
    let rows = query
        .select_tuple((&team.name, &avg))
        .from(&member)
        .join(&member.team, &team)
        .group_by(&team.name)
        .order_by(team.name.asc())
        .fetch()
        .await
        .expect("grouped");

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get(&team.name).as_deref(), Some("teamA"));
    assert_eq!(rows[0].get(&avg), Some(15.0));
    assert_eq!(rows[1].get(&team.name).as_deref(), Some("teamB"));
    assert_eq!(rows[1].get(&avg), Some(35.0));
}

#[tokio::test]
async fn having_filters_groups() {
    let (_db, session, _) = setup().await;
    let query = session.query();
    let member = QMember::member();
    let team = QTeam::team();

    let names = query
        .select(&team.name)
        .from(&member)
        .join(&member.team, &team)
        .group_by(&team.name)
        .having(member.age.avg().gt(20))
        .fetch()
        .await
        .expect("having");

    assert_eq!(names, vec!["teamB".to_owned()]);
}

#[tokio::test]
async fn inner_join_on_association() {
    let (_db, session, _) = setup().await;
    let query = session.query();
    let member = QMember::member();
    let team = QTeam::team();

    let found = query
        .select_from(&member)
        .join(&member.team, &team)
        .filter(team.name.eq("teamA"))
        .order_by(member.id.asc())
        .fetch()
        .await
        .expect("join");

    assert_eq!(usernames(&found), vec!["member1", "member2"]);
}

#[tokio::test]
async fn theta_join_between_unrelated_entities() {
    let (_db, session, _) = setup().await;
    for name in ["teamA", "teamB", "teamC"] {
        session.persist(&mut Member::named(name)).await.expect("persist");
    }
    let query = session.query();
    let member = QMember::member();
    let team = QTeam::team();

    let found = query
        .select_from(&member)
        .from(&team)
        .filter(member.username.eq(&team.name))
        .order_by(member.id.asc())
        .fetch()
        .await
        .expect("theta join");

    assert_eq!(usernames(&found), vec!["teamA", "teamB"]);
}

#[tokio::test]
async fn left_join_with_on_filter_keeps_every_member() {
    let (_db, session, _) = setup().await;
    let query = session.query();
    let member = QMember::member();
    let team = QTeam::team();

    let rows = query
        .select_tuple((&member, &team))
        .from(&member)
        .left_join(&member.team, &team)
        .on(team.name.eq("teamA"))
        .order_by(member.id.asc())
        .fetch()
        .await
        .expect("left join");

    assert_eq!(rows.len(), 4);
    let teams: Vec<Option<String>> = rows
        .iter()
        .map(|row| row.entity(&team).map(|t| t.name().to_owned()))
        .collect();
    assert_eq!(
        teams,
        vec![Some("teamA".to_owned()), Some("teamA".to_owned()), None, None]
    );
    assert_eq!(
        rows[2].entity(&member).and_then(|m| m.username().map(str::to_owned)).as_deref(),
        Some("member3")
    );
}

#[tokio::test]
async fn left_join_without_relation() {
    let (_db, session, _) = setup().await;
    for name in ["teamA", "teamB", "teamC"] {
        session.persist(&mut Member::named(name)).await.expect("persist");
    }
    let query = session.query();
    let member = QMember::member();
    let team = QTeam::team();

    let rows = query
        .select_tuple((&member, &team))
        .from(&member)
        .left_join_entity(&team)
        .on(member.username.eq(&team.name))
        .order_by(member.id.asc())
        .fetch()
        .await
        .expect("left join");

    assert_eq!(rows.len(), 7);
    let matched: Vec<(String, String)> = rows
        .iter()
        .filter_map(|row| {
            let m = row.entity(&member)?;
            let t = row.entity(&team)?;
            Some((m.username()?.to_owned(), t.name().to_owned()))
        })
        .collect();
    assert_eq!(
        matched,
        vec![
            ("teamA".to_owned(), "teamA".to_owned()),
            ("teamB".to_owned(), "teamB".to_owned()),
        ]
    );
}

#[tokio::test]
async fn plain_query_leaves_team_unloaded() {
    let (_db, session, _) = setup().await;
    session.flush().await.expect("flush");
    session.clear().await;
    let query = session.query();
    let member = QMember::member();

    let found = query
        .select_from(&member)
        .filter(member.username.eq("member1"))
        .fetch_one()
        .await
        .expect("member1");

    let team = found.team().expect("team reference");
    assert!(!team.is_loaded());

    let loaded = team.load(&session).await.expect("lazy load");
    assert_eq!(loaded.name(), "teamA");
    assert!(team.is_loaded());
}

#[tokio::test]
async fn fetch_join_loads_team_with_member() {
    let (_db, session, _) = setup().await;
    session.flush().await.expect("flush");
    session.clear().await;
    let query = session.query();
    let member = QMember::member();
    let team = QTeam::team();

    let found = query
        .select_from(&member)
        .join(&member.team, &team)
        .fetch_join()
        .filter(member.username.eq("member1"))
        .fetch_one()
        .await
        .expect("member1");

    let reference = found.team().expect("team reference");
    assert!(reference.is_loaded());
    assert_eq!(reference.get().map(Team::name), Some("teamA"));
}

#[tokio::test]
async fn team_lists_its_members() {
    let (_db, session, data) = setup().await;
    let query = session.query();
    let team = QTeam::team();

    let members = data.team_a.members(&query).await.expect("members");
    assert_eq!(usernames(&members), vec!["member1", "member2"]);

    let size = team.members.size();
    let rows = query
        .select_tuple((&team.name, &size))
        .from(&team)
        .order_by(team.name.asc())
        .fetch()
        .await
        .expect("sizes");
    assert_eq!(rows.iter().map(|row| row.get(&size)).collect::<Vec<_>>(), vec![Some(2), Some(2)]);
}

#[tokio::test]
async fn team_changes_only_before_persist() {
    let (_db, session, data) = setup().await;

    let mut newcomer = Member::with_team("member5", 50, &data.team_a).expect("with team");
    newcomer.change_team(&data.team_b).expect("change team");
    assert_eq!(newcomer.team().map(LazyRef::id), data.team_b.id());
    session.persist(&mut newcomer).await.expect("persist");

    let mut member1 = data.members[0].clone();
    let err = member1.change_team(&data.team_b).unwrap_err();
    assert!(matches!(err, QuarryError::InvalidQuery(_)));
    assert_eq!(member1.team().map(LazyRef::id), data.team_a.id());

    let err = newcomer.change_team(&data.team_a).unwrap_err();
    assert!(matches!(err, QuarryError::InvalidQuery(_)));
}

#[tokio::test]
async fn sub_query_eq_max_age() {
    let (_db, session, _) = setup().await;
    let query = session.query();
    let member = QMember::member();
    let member_sub = QMember::new("member_sub");

    let found = query
        .select_from(&member)
        .filter(member.age.eq(SubQuery::select(&member_sub.age.max()).from(&member_sub)))
        .fetch()
        .await
        .expect("sub query");

    assert_eq!(found.iter().map(Member::age).collect::<Vec<_>>(), vec![40]);
}

#[tokio::test]
async fn sub_query_goe_average_age() {
    let (_db, session, _) = setup().await;
    let query = session.query();
    let member = QMember::member();
    let member_sub = QMember::new("member_sub");

    let found = query
        .select_from(&member)
        .filter(member.age.goe(SubQuery::select(&member_sub.age.avg()).from(&member_sub)))
        .order_by(member.age.asc())
        .fetch()
        .await
        .expect("sub query");

    assert_eq!(found.iter().map(Member::age).collect::<Vec<_>>(), vec![30, 40]);
}

#[tokio::test]
async fn sub_query_in() {
    let (_db, session, _) = setup().await;
    let query = session.query();
    let member = QMember::member();
    let member_sub = QMember::new("member_sub");

    let found = query
        .select_from(&member)
        .filter(
            member.age.in_subquery(
                SubQuery::select(&member_sub.age)
                    .from(&member_sub)
                    .filter(member_sub.age.gt(10)),
            ),
        )
        .order_by(member.age.asc())
        .fetch()
        .await
        .expect("sub query");

    assert_eq!(found.iter().map(Member::age).collect::<Vec<_>>(), vec![20, 30, 40]);
}

#[tokio::test]
async fn sub_query_in_select_list() {
    let (_db, session, _) = setup().await;
    let query = session.query();
    let member = QMember::member();
    let member_sub = QMember::new("member_sub");

    let average = SubQuery::select(&member_sub.age.avg()).from(&member_sub);
    let rows = query
        .select_tuple((&member.username, &average))
        .from(&member)
        .order_by(member.id.asc())
        .fetch()
        .await
        .expect("sub query select");

    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0].get(&member.username).as_deref(), Some("member1"));
    assert!(rows.iter().all(|row| row.get(&average) == Some(25.0)));
}

#[tokio::test]
async fn simple_case_labels_ages() {
    let (_db, session, _) = setup().await;
    let query = session.query();
    let member = QMember::member();

    let labels = query
        .select(
            member
                .age
                .when(10)
                .then("ten")
                .when(20)
                .then("twenty")
                .otherwise("other"),
        )
        .from(&member)
        .order_by(member.id.asc())
        .fetch()
        .await
        .expect("case");

    assert_eq!(labels, vec!["ten", "twenty", "other", "other"]);
}

#[tokio::test]
async fn searched_case_buckets_ages() {
    let (_db, session, _) = setup().await;
    let query = session.query();
    let member = QMember::member();

    let buckets = query
        .select(
            CaseBuilder::new()
                .when(member.age.between(0, 20))
                .then("0-20")
                .when(member.age.between(21, 30))
                .then("21-30")
                .otherwise("other"),
        )
        .from(&member)
        .order_by(member.id.asc())
        .fetch()
        .await
        .expect("case");

    assert_eq!(buckets, vec!["0-20", "0-20", "21-30", "other"]);
}

#[tokio::test]
async fn order_by_case_rank() {
    let (_db, session, _) = setup().await;
    let query = session.query();
    let member = QMember::member();

    let rank = CaseBuilder::new()
        .when(member.age.between(0, 20))
        .then(2)
        .when(member.age.between(21, 30))
        .then(1)
        .otherwise(3);
    let rows = query
        .select_tuple((&member.username, &member.age, &rank))
        .from(&member)
        .order_by(rank.desc())
        .order_by(member.id.asc())
        .fetch()
        .await
        .expect("ordered");

    let ranked: Vec<(String, i32)> = rows
        .iter()
        .filter_map(|row| Some((row.get(&member.username)?, row.get(&rank)?)))
        .collect();
    assert_eq!(
        ranked,
        vec![
            ("member4".to_owned(), 3),
            ("member1".to_owned(), 2),
            ("member2".to_owned(), 2),
            ("member3".to_owned(), 1),
        ]
    );
}

#[tokio::test]
async fn constant_in_every_row() {
    let (_db, session, _) = setup().await;
    let query = session.query();
    let member = QMember::member();

    let constant = Expressions::constant("A");
    let rows = query
        .select_tuple((&member.username, &constant))
        .from(&member)
        .fetch()
        .await
        .expect("constant");

    assert_eq!(rows.len(), 4);
    assert!(rows.iter().all(|row| row.get(&constant).as_deref() == Some("A")));
}

#[tokio::test]
async fn concat_username_and_age() {
    let (_db, session, _) = setup().await;
    let query = session.query();
    let member = QMember::member();

    let label = query
        .select(member.username.concat("_").concat(member.age.string_value()))
        .from(&member)
        .filter(member.username.eq("member1"))
        .fetch_one()
        .await
        .expect("concat");

    assert_eq!(label, "member1_10");
}

#[tokio::test]
async fn single_column_projection() {
    let (_db, session, _) = setup().await;
    let query = session.query();
    let member = QMember::member();

    let names = query
        .select(&member.username)
        .from(&member)
        .order_by(member.id.asc())
        .fetch()
        .await
        .expect("projection");

    assert_eq!(names, vec!["member1", "member2", "member3", "member4"]);
}

#[tokio::test]
async fn tuple_projection() {
    let (_db, session, _) = setup().await;
    let query = session.query();
    let member = QMember::member();

    let rows = query
        .select_tuple((&member.username, &member.age))
        .from(&member)
        .order_by(member.id.asc())
        .fetch()
        .await
        .expect("tuples");

    assert_eq!(rows.len(), 4);
    assert_eq!(rows[3].get(&member.username).as_deref(), Some("member4"));
    assert_eq!(rows[3].get(&member.age), Some(40));
    assert_eq!(rows[0].get(&member.age.max()), None);
    assert_eq!(rows[0].to_string(), "[member1, 10]");
}

fn expected_member_dtos() -> Vec<MemberDto> {
    vec![
        MemberDto::new("member1".to_owned(), 10),
        MemberDto::new("member2".to_owned(), 20),
        MemberDto::new("member3".to_owned(), 30),
        MemberDto::new("member4".to_owned(), 40),
    ]
}

#[tokio::test]
async fn dto_by_setters() {
    let (_db, session, _) = setup().await;
    let query = session.query();
    let member = QMember::member();

    let dtos = query
        .select(Projections::bean::<MemberDto>((&member.username, &member.age)))
        .from(&member)
        .order_by(member.id.asc())
        .fetch()
        .await
        .expect("bean");

    assert_eq!(dtos, expected_member_dtos());
}

#[tokio::test]
async fn dto_by_fields() {
    let (_db, session, _) = setup().await;
    let query = session.query();
    let member = QMember::member();

    let dtos = query
        .select(Projections::fields::<MemberDto>((&member.username, &member.age)))
        .from(&member)
        .order_by(member.id.asc())
        .fetch()
        .await
        .expect("fields");

    assert_eq!(dtos, expected_member_dtos());
}

#[tokio::test]
async fn dto_by_constructor() {
    let (_db, session, _) = setup().await;
    let query = session.query();
    let member = QMember::member();

    let dtos = query
        .select(Projections::constructor::<MemberDto>((&member.username, &member.age)))
        .from(&member)
        .order_by(member.id.asc())
        .fetch()
        .await
        .expect("constructor");
    assert_eq!(dtos, expected_member_dtos());

    let users = query
        .select(Projections::constructor::<UserDto>((&member.username, &member.age)))
        .from(&member)
        .order_by(member.id.asc())
        .fetch()
        .await
        .expect("constructor");
    assert_eq!(users[0], UserDto::new("member1".to_owned(), 10));
}

#[tokio::test]
async fn user_dto_through_aliases() {
    let (_db, session, _) = setup().await;
    let query = session.query();
    let member = QMember::member();
    let member_sub = QMember::new("member_sub");

    let users = query
        .select(Projections::fields::<UserDto>((
            member.username.as_("name"),
            SubQuery::select(&member_sub.age.max())
                .from(&member_sub)
                .as_("age"),
        )))
        .from(&member)
        .order_by(member.id.asc())
        .fetch()
        .await
        .expect("aliased");

    assert_eq!(users.len(), 4);
    assert_eq!(users[0].name, "member1");
    assert!(users.iter().all(|user| user.age == 40));

    let through_setters = query
        .select(Projections::bean::<UserDto>((
            member.username.as_("name"),
            SubQuery::select(&member_sub.age.max())
                .from(&member_sub)
                .as_("age"),
        )))
        .from(&member)
        .order_by(member.id.asc())
        .fetch()
        .await
        .expect("aliased setters");
    assert_eq!(through_setters, users);
}

#[tokio::test]
async fn unmatched_property_name_is_an_error() {
    let (_db, session, _) = setup().await;
    let query = session.query();
    let member = QMember::member();

    let result = query
        .select(Projections::bean::<UserDto>((&member.username, &member.age)))
        .from(&member)
        .fetch()
        .await;

    match result {
        Err(QuarryError::UnknownProperty { property, .. }) => assert_eq!(property, "username"),
        other => panic!("expected UnknownProperty, got {:?}", other),
    }
}

#[tokio::test]
async fn projection_mapping_errors() {
    let (_db, session, _) = setup().await;
    let query = session.query();
    let member = QMember::member();

    let unnamed = query
        .select(Projections::fields::<MemberDto>((
            member.username.concat("!"),
            &member.age,
        )))
        .from(&member)
        .fetch()
        .await;
    assert!(matches!(unnamed, Err(QuarryError::InvalidQuery(_))));

    let short = query
        .select(Projections::constructor::<MemberDto>((&member.username,)))
        .from(&member)
        .fetch()
        .await;
    assert!(matches!(
        short,
        Err(QuarryError::ArityMismatch {
            expected: 2,
            found: 1,
            ..
        })
    ));
}
