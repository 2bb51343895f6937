use rocket::{serde::json::Json, Route, State};

use crate::error::Result;
use crate::model::{QuestionSpec, QuestionView};
use crate::mutator;
use crate::store::Store;

pub fn routes() -> Vec<Route> {
    routes![
        get_questions,
        create_question,
        edit_question,
        delete_question,
        activate_question,
        deactivate,
    ]
}

#[get("/questions")]
async fn get_questions(store: &State<Store>) -> Result<Json<Vec<QuestionView>>> {
    let questions = mutator::list_questions(&***store).await?;
    Ok(Json(questions.into_iter().map(QuestionView::from).collect()))
}

#[post("/questions?<activate>", data = "<spec>", format = "json")]
async fn create_question(
    activate: Option<bool>,
    spec: Json<QuestionSpec>,
    store: &State<Store>,
) -> Result<Json<QuestionView>> {
    let activate = activate.unwrap_or(false);
    let question = mutator::create_question(&***store, spec.0, activate).await?;
    Ok(Json(question.into()))
}

#[put("/questions/<question_id>", data = "<spec>", format = "json")]
async fn edit_question(
    question_id: &str,
    spec: Json<QuestionSpec>,
    store: &State<Store>,
) -> Result<Json<QuestionView>> {
    let question = mutator::edit_question(&***store, question_id, spec.0).await?;
    Ok(Json(question.into()))
}

#[delete("/questions/<question_id>")]
async fn delete_question(question_id: &str, store: &State<Store>) -> Result<()> {
    mutator::delete_question(&***store, question_id).await
}

#[post("/questions/<question_id>/activate")]
async fn activate_question(question_id: &str, store: &State<Store>) -> Result<Json<QuestionView>> {
    let question = mutator::activate_question(&***store, question_id).await?;
    Ok(Json(question.into()))
}

#[post("/active/deactivate")]
async fn deactivate(store: &State<Store>) -> Result<()> {
    mutator::deactivate(&***store).await
}

#[cfg(test)]
mod tests {
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::Client,
        serde::json::serde_json,
    };

    use crate::client_and_store;
    use crate::model::{ActivePointer, Question};
    use crate::store::{self, MemoryStore};

    use super::*;

    async fn post_question(client: &Client, spec: &QuestionSpec, activate: bool) -> QuestionView {
        let response = client
            .post(uri!(create_question(Some(activate))))
            .header(ContentType::JSON)
            .body(serde_json::to_string(spec).unwrap())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let raw_response = response.into_string().await.unwrap();
        serde_json::from_str(&raw_response).unwrap()
    }

    async fn pointer(store: &MemoryStore) -> ActivePointer {
        ActivePointer::load(store).await.unwrap()
    }

    #[rocket::async_test]
    async fn create_and_list() {
        let (client, store) = client_and_store().await;
        let first = post_question(&client, &QuestionSpec::example1(), false).await;
        assert_eq!(first.domain, "Tooling");
        assert_eq!(pointer(&store).await, ActivePointer::default());
        let second = post_question(&client, &QuestionSpec::example2(), true).await;
        assert_eq!(pointer(&store).await, ActivePointer::new(second.id.clone()));

        let response = client.get(uri!(get_questions)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let raw_response = response.into_string().await.unwrap();
        let listed: Vec<QuestionView> = serde_json::from_str(&raw_response).unwrap();
        let ids: Vec<_> = listed.into_iter().map(|q| q.id).collect();
        // Created in the same millisecond, the order between them is unspecified.
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&first.id) && ids.contains(&second.id));
    }

    #[rocket::async_test]
    async fn reject_invalid_question() {
        let (client, store) = client_and_store().await;
        let mut spec = QuestionSpec::example1();
        spec.text = "   ".to_string();
        let response = client
            .post(uri!(create_question(Some(true))))
            .header(ContentType::JSON)
            .body(serde_json::to_string(&spec).unwrap())
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());
        assert!(mutator::list_questions(&store).await.unwrap().is_empty());
        assert_eq!(pointer(&store).await, ActivePointer::default());
    }

    #[rocket::async_test]
    async fn edit_existing_question() {
        let (client, store) = client_and_store().await;
        let question = post_question(&client, &QuestionSpec::example1(), false).await;

        let response = client
            .put(uri!(edit_question(question.id.as_str())))
            .header(ContentType::JSON)
            .body(serde_json::to_string(&QuestionSpec::example2()).unwrap())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let raw_response = response.into_string().await.unwrap();
        let edited: QuestionView = serde_json::from_str(&raw_response).unwrap();
        assert_eq!(edited.id, question.id);
        assert_eq!(edited.options, QuestionSpec::example2().options);
        assert!(edited.updated_at.is_some());

        let stored: Question = store::fetch(&store, &question.id).await.unwrap().unwrap();
        assert_eq!(stored.text, QuestionSpec::example2().text);

        let response = client
            .put(uri!(edit_question("missing")))
            .header(ContentType::JSON)
            .body(serde_json::to_string(&QuestionSpec::example2()).unwrap())
            .dispatch()
            .await;
        assert_eq!(Status::NotFound, response.status());
    }

    #[rocket::async_test]
    async fn activate_and_deactivate() {
        let (client, store) = client_and_store().await;
        let question = post_question(&client, &QuestionSpec::example1(), false).await;

        let response = client
            .post(uri!(activate_question(question.id.as_str())))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        assert_eq!(pointer(&store).await, ActivePointer::new(question.id.clone()));

        let response = client.post(uri!(deactivate)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        assert_eq!(pointer(&store).await, ActivePointer::default());

        let response = client
            .post(uri!(activate_question("missing")))
            .dispatch()
            .await;
        assert_eq!(Status::NotFound, response.status());
        assert_eq!(pointer(&store).await, ActivePointer::default());
    }

    #[rocket::async_test]
    async fn delete_leaves_pointer() {
        let (client, store) = client_and_store().await;
        let question = post_question(&client, &QuestionSpec::example1(), true).await;

        let response = client
            .delete(uri!(delete_question(question.id.as_str())))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        assert!(mutator::list_questions(&store).await.unwrap().is_empty());
        // The pointer is left dangling, and reads as inactive.
        assert_eq!(pointer(&store).await, ActivePointer::new(question.id.clone()));
        assert!(mutator::active_question(&store).await.unwrap().is_none());

        let response = client
            .delete(uri!(delete_question(question.id.as_str())))
            .dispatch()
            .await;
        assert_eq!(Status::NotFound, response.status());
    }
}
