use crate::query::{
    ast::delete::Delete,
    renderer::{Render, Renderer},
};

impl Render for Delete {
    fn render(&self, r: &mut Renderer) {
        r.sql.push_str("DELETE FROM ");
        r.push_ident(&self.table.name);
        if let Some(where_clause) = &self.where_clause {
            r.sql.push_str(" WHERE ");
            where_clause.render(r);
        }
    }
}
