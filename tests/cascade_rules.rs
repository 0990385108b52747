//! Integration tests for how deletes propagate through the relationship
//! graph: cascade, detach (set null) or refuse.

mod common;

use stack_metastore::models::{
    FlavorCreate, PermissionType, PipelineCreate, PipelineRunCreate, RoleCreate,
    StackComponentType, StackCreate, StackUpdate, TeamCreate,
};
use stack_metastore::storage::{ComponentFilter, RoleAssignmentFilter, RunFilter};
use stack_metastore::StoreError;

#[tokio::test]
async fn test_project_delete_cascades_to_scoped_entities() {
    let db = common::store().await;
    let p1 = common::project(&db, "p1").await;
    let p2 = common::project(&db, "p2").await;
    let alice = common::user(&db, "alice").await;

    let orchestrator = common::component(
        &db,
        p1.id,
        Some(alice.id),
        StackComponentType::Orchestrator,
        "orch",
    )
    .await;
    let stack = db
        .create_stack(&StackCreate::new("s1", p1.id).with_component(orchestrator.id))
        .await
        .unwrap();
    let pipeline = db
        .create_pipeline(&PipelineCreate::new("training", p1.id))
        .await
        .unwrap();
    let run = db
        .create_pipeline_run(
            &PipelineRunCreate::new("training-1", p1.id)
                .on_stack(stack.id)
                .of_pipeline(pipeline.id),
        )
        .await
        .unwrap();
    let flavor = db
        .create_flavor(&FlavorCreate::new(
            "airflow",
            StackComponentType::Orchestrator,
            "flavors.Airflow",
            p1.id,
        ))
        .await
        .unwrap();
    let other = common::component(&db, p2.id, None, StackComponentType::ArtifactStore, "art").await;

    let admin = db.create_role(&RoleCreate::new("admin")).await.unwrap();
    let scoped = db
        .assign_role_to_user(admin.id, alice.id, Some(p1.id))
        .await
        .unwrap();
    let global = db.assign_role_to_user(admin.id, alice.id, None).await.unwrap();

    db.delete_project(p1.id).await.unwrap();

    assert_eq!(db.get_component(orchestrator.id).await.unwrap_err().code(), "NOT_FOUND");
    assert_eq!(db.get_stack(stack.id).await.unwrap_err().code(), "NOT_FOUND");
    assert_eq!(db.get_pipeline(pipeline.id).await.unwrap_err().code(), "NOT_FOUND");
    assert_eq!(db.get_pipeline_run(run.id).await.unwrap_err().code(), "NOT_FOUND");
    assert_eq!(db.get_flavor(flavor.id).await.unwrap_err().code(), "NOT_FOUND");

    let assignments = db
        .list_role_assignments(&RoleAssignmentFilter::new().with_user(alice.id))
        .await
        .unwrap();
    let ids: Vec<_> = assignments.iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![global.id]);
    assert!(!ids.contains(&scoped.id));

    // Unscoped and foreign entities are untouched.
    assert_eq!(db.get_user(alice.id).await.unwrap().name, "alice");
    assert_eq!(db.get_role(admin.id).await.unwrap().name, "admin");
    assert_eq!(db.get_component(other.id).await.unwrap().project.id, p2.id);
}

#[tokio::test]
async fn test_user_delete_detaches_created_entities() {
    let db = common::store().await;
    let p1 = common::project(&db, "p1").await;
    let alice = common::user(&db, "alice").await;

    let component = common::component(
        &db,
        p1.id,
        Some(alice.id),
        StackComponentType::Orchestrator,
        "orch",
    )
    .await;
    let stack = db
        .create_stack(
            &StackCreate::new("s1", p1.id)
                .with_user(alice.id)
                .with_component(component.id),
        )
        .await
        .unwrap();
    let pipeline = db
        .create_pipeline(&PipelineCreate::new("training", p1.id).with_user(alice.id))
        .await
        .unwrap();
    let run = db
        .create_pipeline_run(&PipelineRunCreate::new("training-1", p1.id).with_user(alice.id))
        .await
        .unwrap();

    let team = db.create_team(&TeamCreate::new("ml")).await.unwrap();
    db.add_user_to_team(team.id, alice.id).await.unwrap();
    let viewer = db.create_role(&RoleCreate::new("viewer")).await.unwrap();
    db.assign_role_to_user(viewer.id, alice.id, None).await.unwrap();

    db.delete_user(alice.id).await.unwrap();

    assert!(db.get_component(component.id).await.unwrap().user.is_none());
    assert!(db.get_stack(stack.id).await.unwrap().user.is_none());
    assert!(db.get_pipeline(pipeline.id).await.unwrap().user.is_none());
    assert!(db.get_pipeline_run(run.id).await.unwrap().user.is_none());

    // The stack keeps its composition.
    assert_eq!(db.get_stack(stack.id).await.unwrap().component_ids(), vec![component.id]);

    assert!(db.list_team_members(team.id).await.unwrap().is_empty());
    assert!(db
        .list_role_assignments(&RoleAssignmentFilter::new().with_role(viewer.id))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_team_delete_removes_memberships_and_assignments() {
    let db = common::store().await;
    let alice = common::user(&db, "alice").await;
    let bob = common::user(&db, "bob").await;
    let team = db.create_team(&TeamCreate::new("ml")).await.unwrap();
    db.add_user_to_team(team.id, alice.id).await.unwrap();
    db.add_user_to_team(team.id, bob.id).await.unwrap();

    let editor = db.create_role(&RoleCreate::new("editor")).await.unwrap();
    db.assign_role_to_team(editor.id, team.id, None).await.unwrap();

    db.delete_team(team.id).await.unwrap();

    assert!(db.list_user_teams(alice.id).await.unwrap().is_empty());
    assert!(db.list_user_teams(bob.id).await.unwrap().is_empty());
    assert!(db
        .list_role_assignments(&RoleAssignmentFilter::new().with_role(editor.id))
        .await
        .unwrap()
        .is_empty());
    assert_eq!(db.list_users().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_role_delete_removes_permissions_and_assignments() {
    let db = common::store().await;
    let alice = common::user(&db, "alice").await;
    let team = db.create_team(&TeamCreate::new("ml")).await.unwrap();
    let role = db
        .create_role(
            &RoleCreate::new("admin")
                .with_permission(PermissionType::Read)
                .with_permission(PermissionType::Write),
        )
        .await
        .unwrap();
    db.assign_role_to_user(role.id, alice.id, None).await.unwrap();
    db.assign_role_to_team(role.id, team.id, None).await.unwrap();

    db.delete_role(role.id).await.unwrap();

    assert_eq!(db.get_role(role.id).await.unwrap_err().code(), "NOT_FOUND");
    assert!(db
        .list_role_assignments(&RoleAssignmentFilter::new())
        .await
        .unwrap()
        .is_empty());
    assert!(db.get_user(alice.id).await.is_ok());
    assert!(db.get_team(team.id).await.is_ok());
}

#[tokio::test]
async fn test_stack_delete_is_refused_while_runs_reference_it() {
    let db = common::store().await;
    let p1 = common::project(&db, "p1").await;
    let component = common::component(&db, p1.id, None, StackComponentType::Orchestrator, "orch").await;
    let stack = db
        .create_stack(&StackCreate::new("s1", p1.id).with_component(component.id))
        .await
        .unwrap();
    let run = db
        .create_pipeline_run(&PipelineRunCreate::new("run-1", p1.id).on_stack(stack.id))
        .await
        .unwrap();

    let err = db.delete_stack(stack.id).await.unwrap_err();
    assert_eq!(err.code(), "RESTRICTED");
    assert!(matches!(err, StoreError::Restricted { entity: "stack", .. }));
    assert_eq!(db.get_stack(stack.id).await.unwrap().component_ids(), vec![component.id]);

    db.delete_pipeline_run(run.id).await.unwrap();
    db.delete_stack(stack.id).await.unwrap();

    // Components outlive the stacks they belonged to.
    assert!(db.get_component(component.id).await.is_ok());
    assert!(db.list_component_stacks(component.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_pipeline_delete_is_refused_while_runs_reference_it() {
    let db = common::store().await;
    let p1 = common::project(&db, "p1").await;
    let pipeline = db
        .create_pipeline(&PipelineCreate::new("training", p1.id))
        .await
        .unwrap();
    db.create_pipeline_run(&PipelineRunCreate::new("run-1", p1.id).of_pipeline(pipeline.id))
        .await
        .unwrap();

    let err = db.delete_pipeline(pipeline.id).await.unwrap_err();
    assert_eq!(err.code(), "RESTRICTED");

    let runs = db
        .list_pipeline_runs(&RunFilter::new().with_pipeline(pipeline.id))
        .await
        .unwrap();
    assert_eq!(runs.len(), 1);
}

#[tokio::test]
async fn test_component_delete_removes_it_from_stacks() {
    let db = common::store().await;
    let p1 = common::project(&db, "p1").await;
    let orchestrator =
        common::component(&db, p1.id, None, StackComponentType::Orchestrator, "orch").await;
    let store = common::component(&db, p1.id, None, StackComponentType::ArtifactStore, "art").await;
    let stack = db
        .create_stack(
            &StackCreate::new("s1", p1.id)
                .with_component(orchestrator.id)
                .with_component(store.id),
        )
        .await
        .unwrap();

    db.delete_component(orchestrator.id).await.unwrap();

    let stack = db.get_stack(stack.id).await.unwrap();
    assert_eq!(stack.component_ids(), vec![store.id]);
    assert!(stack.component(StackComponentType::Orchestrator).is_none());

    let remaining = db
        .list_components(&ComponentFilter::new().with_project(p1.id))
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
}

#[tokio::test]
async fn test_run_cannot_reference_another_projects_stack_or_pipeline() {
    let db = common::store().await;
    let p1 = common::project(&db, "p1").await;
    let p2 = common::project(&db, "p2").await;
    let s2 = db.create_stack(&StackCreate::new("s2", p2.id)).await.unwrap();
    let training = db
        .create_pipeline(&PipelineCreate::new("training", p2.id))
        .await
        .unwrap();

    let err = db
        .create_pipeline_run(&PipelineRunCreate::new("r", p1.id).on_stack(s2.id))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::Consistency {
            entity: "stack",
            field: "project"
        }
    ));

    let err = db
        .create_pipeline_run(&PipelineRunCreate::new("r", p1.id).of_pipeline(training.id))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "CONSISTENCY_ERROR");
    assert!(db
        .list_pipeline_runs(&RunFilter::new().with_project(p1.id))
        .await
        .unwrap()
        .is_empty());

    // Nothing outside p2 points into it, so its delete cascades fully.
    db.delete_project(p2.id).await.unwrap();
    assert_eq!(db.get_stack(s2.id).await.unwrap_err().code(), "NOT_FOUND");
    assert_eq!(db.get_pipeline(training.id).await.unwrap_err().code(), "NOT_FOUND");
}

#[tokio::test]
async fn test_stack_cannot_hold_another_projects_component() {
    let db = common::store().await;
    let p1 = common::project(&db, "p1").await;
    let p2 = common::project(&db, "p2").await;
    let foreign = common::component(&db, p2.id, None, StackComponentType::Orchestrator, "orch").await;

    let err = db
        .create_stack(&StackCreate::new("s1", p1.id).with_component(foreign.id))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::Consistency {
            entity: "stack_component",
            field: "project"
        }
    ));
    assert!(db.list_project_stacks(p1.id).await.unwrap().is_empty());

    let s1 = db.create_stack(&StackCreate::new("s1", p1.id)).await.unwrap();
    let err = db
        .add_component_to_stack(s1.id, foreign.id)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "CONSISTENCY_ERROR");

    let update = StackUpdate {
        components: Some(vec![foreign.id]),
        ..Default::default()
    };
    let err = db.update_stack(s1.id, &update).await.unwrap_err();
    assert_eq!(err.code(), "CONSISTENCY_ERROR");
    assert!(db.get_stack(s1.id).await.unwrap().component_ids().is_empty());

    db.delete_project(p2.id).await.unwrap();
    assert!(db.get_stack(s1.id).await.is_ok());
}
