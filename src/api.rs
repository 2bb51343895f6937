use rocket::Route;

mod admin;
mod poll;
mod results;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(admin::routes());
    routes.extend(poll::routes());
    routes.extend(results::routes());
    routes
}
