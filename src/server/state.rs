use crate::Session;

pub struct AppState {
    pub session: Session,
}
