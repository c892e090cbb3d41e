pub trait Configuration: Clone + Send + Sync + 'static {
    fn admin_password(&self) -> String;
    fn database_url(&self) -> Option<String>;
    fn port(&self) -> String;
}
